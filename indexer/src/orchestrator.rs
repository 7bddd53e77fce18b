//! Orchestrator: the fetch/enrich/process/load/checkpoint loop.
//!
//! One event is in flight at a time. Events are processed strictly in
//! `(block_number, log_index)` order and the checkpoint advances only after
//! an event's changesets all applied, so a crash at any point replays from
//! the last fully-processed event (at-least-once, backed by idempotent
//! writes).
//!
//! # Components
//!
//! - [`Orchestrator`]: owns the queue, registries and ports, drives the loop
//! - [`ShutdownSignal`]: cloneable cancellation flag checked between events
//! - [`EventOutcome`]: explicit per-event verdict used for logging and
//!   metrics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_FETCH_DELAY_MS, DEFAULT_FETCH_LIMIT};
use crate::error::IndexerError;
use crate::events::fetcher::EventsFetcher;
use crate::events::queue::EventQueue;
use crate::events::types::{ProcessorEvent, CONTRACT_STRATEGY};
use crate::loader::DataLoader;
use crate::metrics::{IndexerMetrics, MetricsSnapshot};
use crate::ports::ChainClient;
use crate::processor::{EventProcessor, StrategyKind};
use crate::registry::{EventsRegistry, StrategyRegistry};

/// Cloneable cancellation flag.
///
/// `cancel()` is checked at the top of each loop iteration; the in-flight
/// event always completes first.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Creates a signal in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// All changesets applied and the checkpoint advanced.
    Applied {
        /// Number of changesets applied.
        changesets: usize,
    },
    /// The event was dropped as expected (unsupported or invalid input).
    Skipped,
    /// Processing or persistence failed; the checkpoint was withheld.
    Failed,
}

/// Drives the indexing pipeline for one chain.
pub struct Orchestrator {
    chain_id: u64,
    fetch_limit: usize,
    fetch_delay: Duration,
    queue: EventQueue<ProcessorEvent>,
    fetcher: Arc<dyn EventsFetcher>,
    chain: Arc<dyn ChainClient>,
    strategy_registry: Box<dyn StrategyRegistry>,
    events_registry: Box<dyn EventsRegistry>,
    processor: EventProcessor,
    loader: DataLoader,
    metrics: Arc<IndexerMetrics>,
    shutdown: ShutdownSignal,
}

impl Orchestrator {
    /// Creates an orchestrator with default fetch tuning.
    #[must_use]
    pub fn new(
        chain_id: u64,
        fetcher: Arc<dyn EventsFetcher>,
        chain: Arc<dyn ChainClient>,
        strategy_registry: Box<dyn StrategyRegistry>,
        events_registry: Box<dyn EventsRegistry>,
        processor: EventProcessor,
        loader: DataLoader,
    ) -> Self {
        Self {
            chain_id,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            fetch_delay: Duration::from_millis(DEFAULT_FETCH_DELAY_MS),
            queue: EventQueue::new(),
            fetcher,
            chain,
            strategy_registry,
            events_registry,
            processor,
            loader,
            metrics: Arc::new(IndexerMetrics::new()),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Sets the fetch page size.
    #[must_use]
    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    /// Sets the delay after an empty or failed fetch.
    #[must_use]
    pub fn with_fetch_delay(mut self, fetch_delay: Duration) -> Self {
        self.fetch_delay = fetch_delay;
        self
    }

    /// Returns a handle that cancels the loop.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Samples the pipeline counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs the loop until the shutdown signal fires.
    pub async fn run(&mut self) {
        info!(chain_id = self.chain_id, "indexer loop started");
        while !self.shutdown.is_cancelled() {
            self.poll_once().await;
        }
        info!(
            chain_id = self.chain_id,
            metrics = ?self.metrics.snapshot(),
            "indexer loop stopped"
        );
    }

    /// Executes one loop iteration: refill the queue if empty, then handle
    /// at most one event.
    pub async fn poll_once(&mut self) {
        if self.queue.is_empty() && !self.refill().await {
            return;
        }

        let Some(event) = self.queue.pop() else {
            // Caught up to the chain head.
            tokio::time::sleep(self.fetch_delay).await;
            return;
        };

        self.handle_event(event).await;
    }

    /// Fetches the next page after the checkpoint. Returns false if the
    /// iteration should end here (a failure already slept).
    async fn refill(&mut self) -> bool {
        let after = match self.events_registry.last_processed_event().await {
            Ok(event) => event.as_ref().map(ProcessorEvent::key).unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "failed to load checkpoint");
                tokio::time::sleep(self.fetch_delay).await;
                return false;
            }
        };

        match self
            .fetcher
            .fetch_events(self.chain_id, after, self.fetch_limit)
            .await
        {
            Ok(events) => {
                if !events.is_empty() {
                    debug!(count = events.len(), after = %after, "fetched events");
                }
                self.metrics.record_fetched(events.len() as u64);
                self.queue.extend(events);
                true
            }
            Err(e) => {
                self.metrics.record_fetch_error();
                warn!(error = %e, after = %after, "event fetch failed");
                tokio::time::sleep(self.fetch_delay).await;
                false
            }
        }
    }

    /// Enriches, processes, loads and checkpoints one event.
    async fn handle_event(&mut self, event: ProcessorEvent) -> EventOutcome {
        let key = event.key();
        let name = event.qualified_name();

        let event = match self.attach_strategy_id(event).await {
            Ok(event) => event,
            Err(e) => return self.settle_error(&name, &e),
        };

        // Unsupported strategies are steady-state on a shared contract set;
        // skip before processing so handlers never see them.
        if event.contract_name == CONTRACT_STRATEGY {
            if let Some(id) = &event.strategy_id {
                if StrategyKind::from_id(id).is_none() {
                    warn!(event = %name, key = %key, strategy_id = %id, "unsupported strategy, skipping");
                    self.metrics.record_skipped();
                    return EventOutcome::Skipped;
                }
            }
        }

        let changesets = match self.processor.process_event(&event).await {
            Ok(changesets) => changesets,
            Err(e) => return self.settle_error(&name, &IndexerError::from(e)),
        };

        let count = changesets.len();
        let result = match self.loader.apply_changes(&changesets).await {
            Ok(result) => result,
            Err(e) => return self.settle_error(&name, &IndexerError::from(e)),
        };
        self.metrics.record_changesets(result.num_successful as u64);

        if !result.is_fully_successful() {
            let e = IndexerError::PartialBatch {
                failed: result.num_failed,
                errors: result.errors,
            };
            error!(event = %name, key = %key, error = %e, "changesets failed, checkpoint withheld");
            self.metrics.record_failed();
            return EventOutcome::Failed;
        }

        if let Err(e) = self.events_registry.save_last_processed_event(&event).await {
            error!(event = %name, key = %key, error = %e, "checkpoint save failed");
            self.metrics.record_failed();
            return EventOutcome::Failed;
        }
        self.metrics.record_checkpoint_save();
        self.metrics.record_processed();
        debug!(event = %name, key = %key, changesets = count, "event applied");
        EventOutcome::Applied { changesets: count }
    }

    /// Attaches the strategy id when the event requires one, reading the
    /// chain only on a registry miss.
    async fn attach_strategy_id(
        &mut self,
        event: ProcessorEvent,
    ) -> Result<ProcessorEvent, IndexerError> {
        if !event.requires_strategy_id() || event.strategy_id.is_some() {
            return Ok(event);
        }

        let address = event.strategy_lookup_address()?;
        let strategy_id = match self.strategy_registry.get_strategy_id(&address).await? {
            Some(id) => id,
            None => {
                let id = self.chain.get_strategy_id(&address).await?;
                self.strategy_registry
                    .save_strategy_id(address, id.clone())
                    .await?;
                id
            }
        };
        Ok(event.with_strategy_id(strategy_id))
    }

    /// Logs an event-level error at the right level and records its
    /// outcome.
    fn settle_error(&self, name: &str, error: &IndexerError) -> EventOutcome {
        if error.is_expected_drop() {
            warn!(event = name, error = %error, "event skipped");
            self.metrics.record_skipped();
            EventOutcome::Skipped
        } else {
            error!(event = name, error = %error, "event failed, checkpoint withheld");
            self.metrics.record_failed();
            EventOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::events::types::{Address, EventKey, StrategyId, CONTRACT_ALLO, CONTRACT_REGISTRY};
    use crate::processor::strategy::DONATION_VOTING_ID;
    use crate::repository::Repository;
    use crate::test_support::{
        make_event, ScriptedFetcher, SharedEventsRegistry, SharedStrategyRegistry,
        StaticChainClient, TestWorld,
    };
    use serde_json::json;

    struct Harness {
        orchestrator: Orchestrator,
        fetcher: Arc<ScriptedFetcher>,
        chain: Arc<StaticChainClient>,
        strategy_registry: SharedStrategyRegistry,
        events_registry: SharedEventsRegistry,
        world: TestWorld,
    }

    fn harness_with(chain_id_result: &str, events_registry: SharedEventsRegistry) -> Harness {
        let world = TestWorld::new();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let chain = Arc::new(StaticChainClient::new(StrategyId::new(chain_id_result)));
        let strategy_registry = SharedStrategyRegistry::default();

        let repository = Arc::clone(&world.repository) as Arc<dyn Repository>;
        let processor = EventProcessor::new(
            Arc::clone(&world.repository) as Arc<dyn Repository>,
            Arc::clone(&world.metadata) as _,
            Arc::new(crate::ports::ZeroPriceSource),
        );
        let loader = DataLoader::new(repository);

        let orchestrator = Orchestrator::new(
            10,
            Arc::clone(&fetcher) as Arc<dyn EventsFetcher>,
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            Box::new(strategy_registry.clone()),
            Box::new(events_registry.clone()),
            processor,
            loader,
        )
        .with_fetch_delay(Duration::from_millis(100));

        Harness {
            orchestrator,
            fetcher,
            chain,
            strategy_registry,
            events_registry,
            world,
        }
    }

    fn harness() -> Harness {
        harness_with(DONATION_VOTING_ID, SharedEventsRegistry::default())
    }

    fn profile_name_updated(block_number: u64, log_index: u64) -> ProcessorEvent {
        let mut event = make_event(CONTRACT_REGISTRY, "ProfileNameUpdated", block_number, log_index);
        event.params = json!({ "profileId": "0xp", "name": "N" });
        event
    }

    fn pool_created(block_number: u64, log_index: u64, strategy: &str) -> ProcessorEvent {
        let mut event = make_event(CONTRACT_ALLO, "PoolCreated", block_number, log_index);
        event.params = json!({
            "poolId": "42",
            "profileId": "0xp",
            "strategy": strategy,
            "token": "0xt0ken",
            "amount": "0",
            "metadata": { "protocol": 1, "pointer": "QmRound" }
        });
        event
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_fetches_from_origin() {
        let mut h = harness();
        h.orchestrator.poll_once().await;

        assert_eq!(h.fetcher.cursors(), vec![EventKey::new(0, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_checkpoint() {
        let checkpoint = profile_name_updated(55, 1);
        let mut h = harness_with(
            DONATION_VOTING_ID,
            SharedEventsRegistry::with_checkpoint(&checkpoint),
        );

        h.orchestrator.poll_once().await;
        assert_eq!(h.fetcher.cursors(), vec![EventKey::new(55, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fetch_sleeps_fetch_delay_without_processing() {
        let mut h = harness();
        let before = tokio::time::Instant::now();
        h.orchestrator.poll_once().await;

        assert_eq!(before.elapsed(), Duration::from_millis(100));
        assert!(h.world.applied_ops().is_empty());
        assert_eq!(h.orchestrator.metrics().events_processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_miss_reads_chain_exactly_once_and_saves() {
        let mut h = harness();
        h.fetcher.push_page(vec![pool_created(100, 0, "0xABC")]);

        h.orchestrator.poll_once().await;

        assert_eq!(h.chain.call_count(), 1);
        assert_eq!(h.strategy_registry.save_count(), 1);
        assert_eq!(
            h.strategy_registry.cached(&Address::new("0xabc")),
            Some(StrategyId::new(DONATION_VOTING_ID))
        );
        assert_eq!(h.world.applied_ops(), vec!["InsertRound:42".to_string()]);
        assert_eq!(h.events_registry.last_key(), Some(EventKey::new(100, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_chain_read() {
        let mut h = harness();
        h.fetcher
            .push_page(vec![pool_created(100, 0, "0xABC"), {
                let mut second = pool_created(101, 0, "0xABC");
                second.params["poolId"] = json!("43");
                second
            }]);

        h.orchestrator.poll_once().await;
        h.orchestrator.poll_once().await;

        assert_eq!(h.chain.call_count(), 1);
        assert_eq!(h.strategy_registry.save_count(), 1);
        assert_eq!(h.events_registry.last_key(), Some(EventKey::new(101, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_strategy_is_skipped_without_side_effects() {
        let mut h = harness_with("0xdeadbeef", SharedEventsRegistry::default());
        let mut event = make_event(CONTRACT_STRATEGY, "Registered", 100, 0);
        event.params = json!({ "recipientId": "0xaa" });
        h.fetcher.push_page(vec![event]);

        h.orchestrator.poll_once().await;

        assert!(h.world.applied_ops().is_empty());
        assert!(h.events_registry.saved_keys().is_empty());
        assert_eq!(h.orchestrator.metrics().events_skipped, 1);
        assert_eq!(h.orchestrator.metrics().events_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_process_in_order_and_checkpoint_is_monotonic() {
        let mut h = harness();
        h.fetcher.push_page(vec![
            profile_name_updated(1, 0),
            profile_name_updated(1, 1),
            profile_name_updated(2, 0),
        ]);

        for _ in 0..3 {
            h.orchestrator.poll_once().await;
        }

        let keys = h.events_registry.saved_keys();
        assert_eq!(
            keys,
            vec![
                EventKey::new(1, 0),
                EventKey::new(1, 1),
                EventKey::new(2, 0)
            ]
        );
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(h.orchestrator.metrics().events_processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_withholds_checkpoint() {
        let mut h = harness();
        h.world
            .fail_changeset(crate::changeset::ChangesetKind::UpdateProject);
        h.fetcher.push_page(vec![profile_name_updated(7, 0)]);

        h.orchestrator.poll_once().await;

        assert!(h.events_registry.saved_keys().is_empty());
        assert_eq!(h.orchestrator.metrics().events_failed, 1);
        assert_eq!(h.orchestrator.metrics().events_processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_sleeps_and_continues() {
        let mut h = harness();
        h.fetcher
            .push_error(FetchError::Transport("connection refused".to_string()));
        h.fetcher.push_page(vec![profile_name_updated(3, 0)]);

        let before = tokio::time::Instant::now();
        h.orchestrator.poll_once().await;
        assert_eq!(before.elapsed(), Duration::from_millis(100));
        assert_eq!(h.orchestrator.metrics().fetch_errors, 1);

        h.orchestrator.poll_once().await;
        assert_eq!(h.events_registry.last_key(), Some(EventKey::new(3, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_contract_is_skipped_and_checkpoint_withheld() {
        // Invalid input is a drop: warn, skip, no changesets.
        let mut h = harness();
        h.fetcher.push_page(vec![make_event("Bogus", "Anything", 5, 0)]);

        h.orchestrator.poll_once().await;

        assert!(h.world.applied_ops().is_empty());
        assert_eq!(h.orchestrator.metrics().events_skipped, 1);
        assert!(h.events_registry.saved_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_cancelled() {
        let mut h = harness();
        let signal = h.orchestrator.shutdown_signal();
        signal.cancel();

        // Already cancelled, so run returns without polling.
        h.orchestrator.run().await;
        assert!(h.fetcher.cursors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_event_completes_before_shutdown() {
        let mut h = harness();
        h.fetcher.push_page(vec![profile_name_updated(9, 0)]);
        let signal = h.orchestrator.shutdown_signal();

        let handle = tokio::spawn(async move {
            h.orchestrator.run().await;
            h
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        signal.cancel();
        let h = handle.await.expect("join");

        assert_eq!(h.events_registry.last_key(), Some(EventKey::new(9, 0)));
    }
}
