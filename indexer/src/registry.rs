//! Strategy and checkpoint registries.
//!
//! Both registries are explicit, constructor-injected state objects rather
//! than module-level singletons: tests instantiate isolated instances and
//! production can swap in durable backings without touching the
//! orchestrator. Only the orchestrator mutates them, so the in-memory
//! implementations need no locking.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::events::types::{Address, ProcessorEvent, StrategyId};

/// Cache of `strategy address -> strategy id`, avoiding repeated on-chain
/// reads.
///
/// A pure cache: an absent result triggers an on-chain read by the caller,
/// followed by a save. No eviction; address cardinality is small.
#[async_trait]
pub trait StrategyRegistry: Send + Sync {
    /// Looks up the cached strategy id for an address.
    async fn get_strategy_id(
        &self,
        strategy_address: &Address,
    ) -> Result<Option<StrategyId>, RegistryError>;

    /// Caches a strategy id for an address.
    async fn save_strategy_id(
        &mut self,
        strategy_address: Address,
        strategy_id: StrategyId,
    ) -> Result<(), RegistryError>;
}

/// Map-backed strategy registry with process lifetime.
#[derive(Debug, Default)]
pub struct InMemoryStrategyRegistry {
    strategies: HashMap<Address, StrategyId>,
}

impl InMemoryStrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl StrategyRegistry for InMemoryStrategyRegistry {
    async fn get_strategy_id(
        &self,
        strategy_address: &Address,
    ) -> Result<Option<StrategyId>, RegistryError> {
        Ok(self.strategies.get(strategy_address).cloned())
    }

    async fn save_strategy_id(
        &mut self,
        strategy_address: Address,
        strategy_id: StrategyId,
    ) -> Result<(), RegistryError> {
        self.strategies.insert(strategy_address, strategy_id);
        Ok(())
    }
}

/// Checkpoint store: the last successfully fully-processed event.
///
/// A single mutable cell, last-write-wins. It defines the resume position
/// after a restart, so a production deployment should back it with durable
/// storage; the pipeline only requires the interface.
#[async_trait]
pub trait EventsRegistry: Send + Sync {
    /// Returns the last fully-processed event, or `None` at cold start.
    async fn last_processed_event(&self) -> Result<Option<ProcessorEvent>, RegistryError>;

    /// Records an event as fully processed.
    async fn save_last_processed_event(
        &mut self,
        event: &ProcessorEvent,
    ) -> Result<(), RegistryError>;
}

/// Single-slot in-memory checkpoint. Not durable across restarts.
#[derive(Debug, Default)]
pub struct InMemoryEventsRegistry {
    last: Option<ProcessorEvent>,
}

impl InMemoryEventsRegistry {
    /// Creates an empty checkpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventsRegistry for InMemoryEventsRegistry {
    async fn last_processed_event(&self) -> Result<Option<ProcessorEvent>, RegistryError> {
        Ok(self.last.clone())
    }

    async fn save_last_processed_event(
        &mut self,
        event: &ProcessorEvent,
    ) -> Result<(), RegistryError> {
        self.last = Some(event.clone());
        Ok(())
    }
}
