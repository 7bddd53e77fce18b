//! Event processing: contract dispatch and per-event handlers.
//!
//! [`EventProcessor::process_event`] routes an event by contract name to one
//! of three sub-processors (Allo, Registry, Strategy), which dispatch by
//! event name (and, for strategy events, by strategy id) to a handler that
//! maps the event into changesets. Handlers are stateless per invocation and
//! touch only the metadata, pricing and repository-read ports.
//!
//! # Components
//!
//! - [`allo`]: Allo pool contract events
//! - [`registry`]: profile registry contract events
//! - [`strategy`]: strategy dispatch table and per-strategy handlers

pub mod allo;
pub mod registry;
pub mod strategy;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::changeset::{Changeset, MetadataPointer};
use crate::error::ProcessingError;
use crate::events::types::{
    Address, ProcessorEvent, CONTRACT_ALLO, CONTRACT_REGISTRY, CONTRACT_STRATEGY,
};
use crate::ports::{MetadataSource, PriceSource};
use crate::repository::Repository;

pub use strategy::StrategyKind;

/// Routes events to per-contract handlers and hands them their ports.
pub struct EventProcessor {
    repository: Arc<dyn Repository>,
    metadata: Arc<dyn MetadataSource>,
    prices: Arc<dyn PriceSource>,
}

impl EventProcessor {
    /// Creates a processor over the given ports.
    #[must_use]
    pub fn new(
        repository: Arc<dyn Repository>,
        metadata: Arc<dyn MetadataSource>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            repository,
            metadata,
            prices,
        }
    }

    /// Maps one event into an ordered list of changesets.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::InvalidEvent`] for an unknown contract name.
    /// - [`ProcessingError::UnsupportedEvent`] for a known contract with an
    ///   unhandled event name.
    /// - [`ProcessingError::UnsupportedStrategy`] for a strategy id with no
    ///   registered handler.
    pub async fn process_event(
        &self,
        event: &ProcessorEvent,
    ) -> Result<Vec<Changeset>, ProcessingError> {
        match event.contract_name.as_str() {
            CONTRACT_ALLO => allo::process(self, event).await,
            CONTRACT_REGISTRY => registry::process(self, event).await,
            CONTRACT_STRATEGY => strategy::process(self, event).await,
            other => Err(ProcessingError::InvalidEvent(other.to_string())),
        }
    }

    /// Resolves a metadata pointer, passing port failures through.
    pub(crate) async fn resolve_metadata(
        &self,
        pointer: &MetadataPointer,
    ) -> Result<Option<serde_json::Value>, ProcessingError> {
        Ok(self.metadata.resolve(pointer).await?)
    }

    /// Converts a token amount into USD.
    pub(crate) async fn convert_to_usd(
        &self,
        chain_id: u64,
        token: &Address,
        amount: Decimal,
    ) -> Result<Decimal, ProcessingError> {
        Ok(self.prices.convert_to_usd(chain_id, token, amount).await?)
    }

    /// Resolves the round owned by a strategy contract.
    pub(crate) async fn round_id_for_strategy(
        &self,
        chain_id: u64,
        strategy_address: &Address,
    ) -> Result<String, ProcessingError> {
        self.repository
            .get_round_id_by_strategy_address(chain_id, strategy_address)
            .await?
            .ok_or_else(|| ProcessingError::RoundNotFound(strategy_address.to_string()))
    }

    /// Resolves the matching token of a round.
    pub(crate) async fn round_token(
        &self,
        chain_id: u64,
        round_id: &str,
    ) -> Result<Address, ProcessingError> {
        self.repository
            .get_round_token(chain_id, round_id)
            .await?
            .ok_or_else(|| ProcessingError::RoundNotFound(round_id.to_string()))
    }

    /// Returns true if a project row exists.
    pub(crate) async fn project_exists(
        &self,
        chain_id: u64,
        project_id: &str,
    ) -> Result<bool, ProcessingError> {
        Ok(self.repository.project_exists(chain_id, project_id).await?)
    }

    /// Lists parked roles for a role hash.
    pub(crate) async fn pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<Vec<crate::changeset::NewPendingProjectRole>, ProcessingError> {
        Ok(self
            .repository
            .get_pending_project_roles(chain_id, role)
            .await?)
    }
}

/// Decodes event params into a typed struct.
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(
    event: &ProcessorEvent,
) -> Result<T, ProcessingError> {
    serde_json::from_value(event.params.clone()).map_err(|e| ProcessingError::InvalidParams {
        event: event.qualified_name(),
        reason: e.to_string(),
    })
}

/// Parses a decimal token amount carried as a string param.
///
/// On-chain uint256 values arrive as JSON strings to avoid precision loss.
pub(crate) fn parse_amount(
    event: &ProcessorEvent,
    value: &str,
) -> Result<Decimal, ProcessingError> {
    value
        .parse::<Decimal>()
        .map_err(|e| ProcessingError::InvalidParams {
            event: event.qualified_name(),
            reason: format!("bad amount {value}: {e}"),
        })
}

/// Builds a [`ProcessingError::UnsupportedEvent`] for an event.
pub(crate) fn unsupported(event: &ProcessorEvent) -> ProcessingError {
    ProcessingError::UnsupportedEvent {
        contract: event.contract_name.clone(),
        event: event.event_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_event, test_processor};

    #[tokio::test]
    async fn test_unknown_contract_is_invalid_event() {
        let (processor, _repo) = test_processor();
        let event = make_event("Bogus", "Anything", 1, 0);

        let error = processor.process_event(&event).await.expect_err("error");
        assert!(matches!(error, ProcessingError::InvalidEvent(name) if name == "Bogus"));
    }

    #[tokio::test]
    async fn test_known_contract_unknown_event_is_unsupported() {
        let (processor, _repo) = test_processor();
        let event = make_event(CONTRACT_ALLO, "BaseFeeUpdated", 1, 0);

        let error = processor.process_event(&event).await.expect_err("error");
        assert!(matches!(error, ProcessingError::UnsupportedEvent { .. }));
    }
}
