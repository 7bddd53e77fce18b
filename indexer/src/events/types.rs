//! Core event types for the indexer.
//!
//! Defines the normalized event envelope delivered by the event source and
//! the identifier newtypes used across the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;

/// Contract name for the Allo pool contract.
pub const CONTRACT_ALLO: &str = "Allo";

/// Contract name for the profile registry contract.
pub const CONTRACT_REGISTRY: &str = "Registry";

/// Contract name for strategy contracts.
pub const CONTRACT_STRATEGY: &str = "Strategy";

/// Event name for pool creation on the Allo contract.
pub const EVENT_POOL_CREATED: &str = "PoolCreated";

/// An EVM address, normalized to lowercase hex.
///
/// Lowercasing at construction makes map lookups case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Creates an address, lowercasing the input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_lowercase())
    }

    /// Returns the address as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A strategy implementation identifier.
///
/// A content hash reported by the strategy contract itself, identifying
/// which strategy variant emitted an event. Normalized to lowercase hex so
/// handler dispatch is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StrategyId(String);

impl StrategyId {
    /// Creates a strategy id, lowercasing the input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_lowercase())
    }

    /// Returns the id as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StrategyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<StrategyId> for String {
    fn from(value: StrategyId) -> Self {
        value.0
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordering key of an event within a chain.
///
/// Derived `Ord` gives lexicographic `(block_number, log_index)` comparison,
/// the processing order guarantee of the pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventKey {
    /// Block number of the event.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
}

impl EventKey {
    /// Creates a new event key.
    #[must_use]
    pub const fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.block_number, self.log_index)
    }
}

/// Transaction context attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    /// Transaction hash.
    pub hash: String,

    /// Index of the transaction within its block.
    pub transaction_index: u64,

    /// Sender of the transaction, when the source provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
}

/// A normalized, contract/event-typed envelope for one on-chain event.
///
/// Created by the fetcher, enriched with a strategy id by the orchestrator,
/// consumed by the processor, and discarded once changesets are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorEvent {
    /// Chain the event was observed on.
    pub chain_id: u64,

    /// Emitting contract, e.g. `Allo`, `Registry`, `Strategy`.
    pub contract_name: String,

    /// Event name, e.g. `PoolCreated`.
    pub event_name: String,

    /// Block number of the event.
    pub block_number: u64,

    /// Log index within the block.
    pub log_index: u64,

    /// Address of the emitting contract.
    pub src_address: Address,

    /// Event-specific parameters, decoded by handlers.
    #[serde(default)]
    pub params: serde_json::Value,

    /// Transaction context.
    pub transaction_fields: TransactionFields,

    /// Strategy variant id, populated by the orchestrator for
    /// `Allo.PoolCreated` and `Strategy.*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<StrategyId>,
}

impl ProcessorEvent {
    /// Returns the ordering key of this event.
    #[must_use]
    pub const fn key(&self) -> EventKey {
        EventKey::new(self.block_number, self.log_index)
    }

    /// Returns the qualified `Contract.Event` name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.contract_name, self.event_name)
    }

    /// Returns true if this event must carry a strategy id before
    /// processing: `Allo.PoolCreated` or any `Strategy.*` event.
    #[must_use]
    pub fn requires_strategy_id(&self) -> bool {
        (self.contract_name == CONTRACT_ALLO && self.event_name == EVENT_POOL_CREATED)
            || self.contract_name == CONTRACT_STRATEGY
    }

    /// Returns the address whose strategy id should be looked up.
    ///
    /// For `PoolCreated` this is the `strategy` field inside params; for
    /// strategy events it is the emitting contract itself.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParams`] if a `PoolCreated` event
    /// has no `strategy` param.
    pub fn strategy_lookup_address(&self) -> Result<Address, ProcessingError> {
        if self.contract_name == CONTRACT_ALLO && self.event_name == EVENT_POOL_CREATED {
            self.params
                .get("strategy")
                .and_then(serde_json::Value::as_str)
                .map(Address::new)
                .ok_or_else(|| ProcessingError::InvalidParams {
                    event: self.qualified_name(),
                    reason: "missing strategy address".to_string(),
                })
        } else {
            Ok(self.src_address.clone())
        }
    }

    /// Returns a copy of this event with the strategy id attached.
    ///
    /// Enrichment constructs a new value instead of mutating in place so the
    /// pre-enrichment event can still be referenced for logging.
    #[must_use]
    pub fn with_strategy_id(self, strategy_id: StrategyId) -> Self {
        Self {
            strategy_id: Some(strategy_id),
            ..self
        }
    }
}
