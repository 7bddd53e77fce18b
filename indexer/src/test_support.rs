//! In-memory doubles shared by the pipeline tests.
//!
//! Every double records what was asked of it behind an `Arc`, so tests can
//! hand ownership to the component under test and still inspect calls
//! afterwards.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::changeset::{
    ApplicationUpdate, ChangesetKind, NewApplication, NewPendingProjectRole, NewProject,
    NewProjectRole, NewRound, ProjectRoleName, ProjectUpdate, RoundUpdate,
};
use crate::error::{FetchError, RegistryError, RepositoryError};
use crate::events::fetcher::EventsFetcher;
use crate::events::types::{Address, EventKey, ProcessorEvent, StrategyId, TransactionFields};
use crate::ports::{ChainClient, MetadataSource, PriceSource};
use crate::processor::EventProcessor;
use crate::registry::{EventsRegistry, StrategyRegistry};
use crate::repository::Repository;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Builds a minimal event for the given contract/event at a position.
pub(crate) fn make_event(
    contract: &str,
    event: &str,
    block_number: u64,
    log_index: u64,
) -> ProcessorEvent {
    ProcessorEvent {
        chain_id: 10,
        contract_name: contract.to_string(),
        event_name: event.to_string(),
        block_number,
        log_index,
        src_address: Address::new("0x5e11000000000000000000000000000000000001"),
        params: serde_json::json!({}),
        transaction_fields: TransactionFields {
            hash: "0xfeed".to_string(),
            transaction_index: 0,
            from: None,
        },
        strategy_id: None,
    }
}

/// Builds a processor over fresh doubles and hands back the world handle.
pub(crate) fn test_processor() -> (EventProcessor, TestWorld) {
    let world = TestWorld::new();
    let processor = EventProcessor::new(
        Arc::clone(&world.repository) as Arc<dyn Repository>,
        Arc::clone(&world.metadata) as Arc<dyn MetadataSource>,
        Arc::new(FixedPriceSource::halving()),
    );
    (processor, world)
}

/// Handles to the doubles behind a [`test_processor`].
pub(crate) struct TestWorld {
    pub repository: Arc<MemoryRepository>,
    pub metadata: Arc<MemoryMetadata>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            repository: Arc::new(MemoryRepository::default()),
            metadata: Arc::new(MemoryMetadata::default()),
        }
    }

    pub fn add_metadata(&self, pointer: &str, document: Value) {
        self.metadata.add(pointer, document);
    }

    pub fn add_project(&self, chain_id: u64, project_id: &str) {
        self.repository.add_project(chain_id, project_id);
    }

    pub fn add_pending_role(
        &self,
        chain_id: u64,
        role: &str,
        address: &Address,
        created_at_block: u64,
    ) {
        self.repository
            .add_pending_role(chain_id, role, address, created_at_block);
    }

    pub fn add_round_for_strategy(&self, chain_id: u64, strategy: &Address, round_id: &str) {
        self.repository
            .add_round_for_strategy(chain_id, strategy, round_id);
    }

    pub fn add_round_token(&self, chain_id: u64, round_id: &str, token: &Address) {
        self.repository.add_round_token(chain_id, round_id, token);
    }

    pub fn applied_ops(&self) -> Vec<String> {
        self.repository.applied_ops()
    }

    pub fn fail_changeset(&self, kind: ChangesetKind) {
        self.repository.fail_changeset(kind);
    }
}

#[derive(Default)]
struct RepoState {
    ops: Vec<String>,
    projects: HashSet<(u64, String)>,
    pending: Vec<NewPendingProjectRole>,
    rounds_by_strategy: HashMap<(u64, Address), String>,
    round_tokens: HashMap<(u64, String), Address>,
    fail_on: Option<ChangesetKind>,
}

/// Recording in-memory [`Repository`] with per-kind failure injection.
#[derive(Default)]
pub(crate) struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    pub fn add_project(&self, chain_id: u64, project_id: &str) {
        locked(&self.state)
            .projects
            .insert((chain_id, project_id.to_string()));
    }

    pub fn add_pending_role(
        &self,
        chain_id: u64,
        role: &str,
        address: &Address,
        created_at_block: u64,
    ) {
        locked(&self.state).pending.push(NewPendingProjectRole {
            chain_id,
            role: role.to_string(),
            address: address.clone(),
            created_at_block,
        });
    }

    pub fn add_round_for_strategy(&self, chain_id: u64, strategy: &Address, round_id: &str) {
        locked(&self.state)
            .rounds_by_strategy
            .insert((chain_id, strategy.clone()), round_id.to_string());
    }

    pub fn add_round_token(&self, chain_id: u64, round_id: &str, token: &Address) {
        locked(&self.state)
            .round_tokens
            .insert((chain_id, round_id.to_string()), token.clone());
    }

    pub fn applied_ops(&self) -> Vec<String> {
        locked(&self.state).ops.clone()
    }

    pub fn fail_changeset(&self, kind: ChangesetKind) {
        locked(&self.state).fail_on = Some(kind);
    }

    fn apply(&self, kind: ChangesetKind, op: String) -> Result<MutexGuard<'_, RepoState>, RepositoryError> {
        let mut state = locked(&self.state);
        if state.fail_on == Some(kind) {
            return Err(RepositoryError::Database("injected failure".to_string()));
        }
        state.ops.push(op);
        Ok(state)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_project(&self, project: &NewProject) -> Result<(), RepositoryError> {
        let mut state = self.apply(
            ChangesetKind::InsertProject,
            format!("InsertProject:{}", project.id),
        )?;
        state
            .projects
            .insert((project.chain_id, project.id.clone()));
        Ok(())
    }

    async fn update_project(
        &self,
        _chain_id: u64,
        project_id: &str,
        _update: &ProjectUpdate,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::UpdateProject,
            format!("UpdateProject:{project_id}"),
        )?;
        Ok(())
    }

    async fn project_exists(
        &self,
        chain_id: u64,
        project_id: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(locked(&self.state)
            .projects
            .contains(&(chain_id, project_id.to_string())))
    }

    async fn insert_project_role(&self, role: &NewProjectRole) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::InsertProjectRole,
            format!(
                "InsertProjectRole:{}:{}:{}",
                role.project_id,
                role.address,
                role.role.as_str()
            ),
        )?;
        Ok(())
    }

    async fn delete_project_role(
        &self,
        _chain_id: u64,
        project_id: &str,
        address: &Address,
        role: ProjectRoleName,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::DeleteProjectRole,
            format!("DeleteProjectRole:{project_id}:{address}:{}", role.as_str()),
        )?;
        Ok(())
    }

    async fn insert_pending_project_role(
        &self,
        role: &NewPendingProjectRole,
    ) -> Result<(), RepositoryError> {
        let mut state = self.apply(
            ChangesetKind::InsertPendingProjectRole,
            format!("InsertPendingProjectRole:{}:{}", role.role, role.address),
        )?;
        state.pending.push(role.clone());
        Ok(())
    }

    async fn get_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<Vec<NewPendingProjectRole>, RepositoryError> {
        Ok(locked(&self.state)
            .pending
            .iter()
            .filter(|p| p.chain_id == chain_id && p.role == role)
            .cloned()
            .collect())
    }

    async fn delete_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.apply(
            ChangesetKind::DeletePendingProjectRoles,
            format!("DeletePendingProjectRoles:{role}"),
        )?;
        state
            .pending
            .retain(|p| !(p.chain_id == chain_id && p.role == role));
        Ok(())
    }

    async fn insert_round(&self, round: &NewRound) -> Result<(), RepositoryError> {
        let mut state = self.apply(
            ChangesetKind::InsertRound,
            format!("InsertRound:{}", round.id),
        )?;
        state.rounds_by_strategy.insert(
            (round.chain_id, round.strategy_address.clone()),
            round.id.clone(),
        );
        state
            .round_tokens
            .insert((round.chain_id, round.id.clone()), round.token.clone());
        Ok(())
    }

    async fn update_round(
        &self,
        _chain_id: u64,
        round_id: &str,
        _update: &RoundUpdate,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::UpdateRound,
            format!("UpdateRound:{round_id}"),
        )?;
        Ok(())
    }

    async fn increment_round_funded_amount(
        &self,
        _chain_id: u64,
        round_id: &str,
        amount: Decimal,
        _amount_in_usd: Decimal,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::IncrementRoundFundedAmount,
            format!("IncrementRoundFundedAmount:{round_id}:{amount}"),
        )?;
        Ok(())
    }

    async fn get_round_token(
        &self,
        chain_id: u64,
        round_id: &str,
    ) -> Result<Option<Address>, RepositoryError> {
        Ok(locked(&self.state)
            .round_tokens
            .get(&(chain_id, round_id.to_string()))
            .cloned())
    }

    async fn get_round_id_by_strategy_address(
        &self,
        chain_id: u64,
        strategy_address: &Address,
    ) -> Result<Option<String>, RepositoryError> {
        Ok(locked(&self.state)
            .rounds_by_strategy
            .get(&(chain_id, strategy_address.clone()))
            .cloned())
    }

    async fn insert_application(
        &self,
        application: &NewApplication,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::InsertApplication,
            format!(
                "InsertApplication:{}:{}",
                application.round_id, application.id
            ),
        )?;
        Ok(())
    }

    async fn update_application(
        &self,
        _chain_id: u64,
        round_id: &str,
        application_id: &str,
        _update: &ApplicationUpdate,
    ) -> Result<(), RepositoryError> {
        self.apply(
            ChangesetKind::UpdateApplication,
            format!("UpdateApplication:{round_id}:{application_id}"),
        )?;
        Ok(())
    }
}

/// [`MetadataSource`] over a fixed pointer-to-document map.
#[derive(Default)]
pub(crate) struct MemoryMetadata {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryMetadata {
    pub fn add(&self, pointer: &str, document: Value) {
        locked(&self.documents).insert(pointer.to_string(), document);
    }
}

#[async_trait]
impl MetadataSource for MemoryMetadata {
    async fn resolve(
        &self,
        pointer: &crate::changeset::MetadataPointer,
    ) -> Result<Option<Value>, FetchError> {
        Ok(locked(&self.documents).get(&pointer.pointer).cloned())
    }
}

/// [`PriceSource`] multiplying every amount by a fixed rate.
pub(crate) struct FixedPriceSource {
    rate: Decimal,
}

impl FixedPriceSource {
    /// One token unit is worth half a dollar.
    pub fn halving() -> Self {
        Self {
            rate: Decimal::new(5, 1),
        }
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn convert_to_usd(
        &self,
        _chain_id: u64,
        _token: &Address,
        amount: Decimal,
    ) -> Result<Decimal, FetchError> {
        Ok(amount * self.rate)
    }
}

/// [`ChainClient`] returning one fixed strategy id and counting reads.
pub(crate) struct StaticChainClient {
    id: StrategyId,
    calls: AtomicUsize,
}

impl StaticChainClient {
    pub fn new(id: StrategyId) -> Self {
        Self {
            id,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for StaticChainClient {
    async fn get_strategy_id(
        &self,
        _strategy_address: &Address,
    ) -> Result<StrategyId, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.id.clone())
    }
}

/// [`EventsFetcher`] replaying scripted pages and recording cursors.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    pages: Mutex<VecDeque<Result<Vec<ProcessorEvent>, FetchError>>>,
    cursors: Mutex<Vec<EventKey>>,
}

impl ScriptedFetcher {
    pub fn push_page(&self, events: Vec<ProcessorEvent>) {
        locked(&self.pages).push_back(Ok(events));
    }

    pub fn push_error(&self, error: FetchError) {
        locked(&self.pages).push_back(Err(error));
    }

    /// Cursors seen so far, in call order.
    pub fn cursors(&self) -> Vec<EventKey> {
        locked(&self.cursors).clone()
    }
}

#[async_trait]
impl EventsFetcher for ScriptedFetcher {
    async fn fetch_events(
        &self,
        _chain_id: u64,
        after: EventKey,
        _limit: usize,
    ) -> Result<Vec<ProcessorEvent>, FetchError> {
        locked(&self.cursors).push(after);
        locked(&self.pages).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct SharedRegistryState {
    strategies: HashMap<Address, StrategyId>,
    saves: usize,
}

/// [`StrategyRegistry`] whose state is observable from outside the owner.
#[derive(Clone, Default)]
pub(crate) struct SharedStrategyRegistry {
    state: Arc<Mutex<SharedRegistryState>>,
}

impl SharedStrategyRegistry {
    pub fn save_count(&self) -> usize {
        locked(&self.state).saves
    }

    pub fn cached(&self, address: &Address) -> Option<StrategyId> {
        locked(&self.state).strategies.get(address).cloned()
    }
}

#[async_trait]
impl StrategyRegistry for SharedStrategyRegistry {
    async fn get_strategy_id(
        &self,
        strategy_address: &Address,
    ) -> Result<Option<StrategyId>, RegistryError> {
        Ok(locked(&self.state).strategies.get(strategy_address).cloned())
    }

    async fn save_strategy_id(
        &mut self,
        strategy_address: Address,
        strategy_id: StrategyId,
    ) -> Result<(), RegistryError> {
        let mut state = locked(&self.state);
        state.strategies.insert(strategy_address, strategy_id);
        state.saves += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SharedCheckpointState {
    last: Option<ProcessorEvent>,
    saves: Vec<EventKey>,
}

/// [`EventsRegistry`] whose checkpoint history is observable from outside
/// the owner.
#[derive(Clone, Default)]
pub(crate) struct SharedEventsRegistry {
    state: Arc<Mutex<SharedCheckpointState>>,
}

impl SharedEventsRegistry {
    pub fn with_checkpoint(event: &ProcessorEvent) -> Self {
        let registry = Self::default();
        locked(&registry.state).last = Some(event.clone());
        registry
    }

    pub fn last_key(&self) -> Option<EventKey> {
        locked(&self.state).last.as_ref().map(ProcessorEvent::key)
    }

    /// Checkpoint keys in save order.
    pub fn saved_keys(&self) -> Vec<EventKey> {
        locked(&self.state).saves.clone()
    }
}

#[async_trait]
impl EventsRegistry for SharedEventsRegistry {
    async fn last_processed_event(&self) -> Result<Option<ProcessorEvent>, RegistryError> {
        Ok(locked(&self.state).last.clone())
    }

    async fn save_last_processed_event(
        &mut self,
        event: &ProcessorEvent,
    ) -> Result<(), RegistryError> {
        let mut state = locked(&self.state);
        state.last = Some(event.clone());
        state.saves.push(event.key());
        Ok(())
    }
}
