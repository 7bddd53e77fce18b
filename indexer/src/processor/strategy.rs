//! Strategy contract events: dispatch table and handlers.
//!
//! Strategy contracts all emit the same event names, so dispatch goes
//! through the strategy id reported by the contract itself. Only ids with
//! a [`StrategyKind`] mapping are handled; everything else is rejected with
//! [`ProcessingError::UnsupportedStrategy`] and dropped upstream without
//! advancing the checkpoint for its side effects.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::changeset::{
    ApplicationStatus, ApplicationUpdate, Changeset, MetadataPointer, NewApplication, RoundUpdate,
};
use crate::error::ProcessingError;
use crate::events::types::{Address, ProcessorEvent, StrategyId};

use super::{decode_params, unsupported, EventProcessor};

/// Strategy id of the donation-voting merkle direct-transfer strategy.
pub(crate) const DONATION_VOTING_ID: &str =
    "0x6f9291df02b2664139cec5703c124e4ebce32879c74b6297faa1468aa5ff9ebf";

/// Strategy id of the direct grants lite strategy.
pub(crate) const DIRECT_GRANTS_LITE_ID: &str =
    "0x9fa6890423649187b1f0e8bf4265f0305ce99523c3d11aa36b35a54617bb0ec0";

/// Timestamps at or past this value mean "no deadline" and map to NULL.
const MAX_TIMESTAMP_SECS: u64 = 253_402_300_799; // 9999-12-31T23:59:59Z

/// Supported strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Quadratic-funding rounds with off-chain donation matching.
    DonationVoting,
    /// Direct grants with no donation window.
    DirectGrantsLite,
}

impl StrategyKind {
    /// Maps a strategy id to its variant, if supported.
    #[must_use]
    pub fn from_id(id: &StrategyId) -> Option<Self> {
        match id.as_str() {
            DONATION_VOTING_ID => Some(Self::DonationVoting),
            DIRECT_GRANTS_LITE_ID => Some(Self::DirectGrantsLite),
            _ => None,
        }
    }

    /// Returns the canonical strategy name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DonationVoting => {
                "allov2.DonationVotingMerkleDistributionDirectTransferStrategy"
            }
            Self::DirectGrantsLite => "allov2.DirectGrantsLiteStrategy",
        }
    }
}

/// Converts an epoch-seconds timestamp to a nullable datetime.
fn to_datetime(secs: u64) -> Option<DateTime<Utc>> {
    if secs > MAX_TIMESTAMP_SECS {
        return None;
    }
    let secs = i64::try_from(secs).ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredParams {
    recipient_id: Address,
    #[serde(default)]
    metadata: Option<MetadataPointer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonationTimestampsParams {
    registration_start_time: u64,
    registration_end_time: u64,
    allocation_start_time: u64,
    allocation_end_time: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectGrantsTimestampsParams {
    registration_start_time: u64,
    registration_end_time: u64,
}

/// Dispatches a strategy event to its handler.
pub(crate) async fn process(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let strategy_id =
        event
            .strategy_id
            .as_ref()
            .ok_or_else(|| ProcessingError::MissingStrategyId {
                contract: event.contract_name.clone(),
                event: event.event_name.clone(),
            })?;
    let kind = StrategyKind::from_id(strategy_id)
        .ok_or_else(|| ProcessingError::UnsupportedStrategy(strategy_id.clone()))?;

    match (kind, event.event_name.as_str()) {
        (_, "Registered") => registered(processor, event).await,
        (_, "UpdatedRegistration") => updated_registration(processor, event).await,
        (StrategyKind::DonationVoting, "TimestampsUpdated") => {
            donation_timestamps_updated(processor, event).await
        }
        (StrategyKind::DirectGrantsLite, "TimestampsUpdated") => {
            direct_grants_timestamps_updated(processor, event).await
        }
        _ => Err(unsupported(event)),
    }
}

/// `Registered`: a recipient applied to the round run by this strategy.
async fn registered(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: RegisteredParams = decode_params(event)?;
    let round_id = processor
        .round_id_for_strategy(event.chain_id, &event.src_address)
        .await?;
    let (metadata_cid, metadata) = resolve_optional_metadata(processor, &params.metadata).await?;

    Ok(vec![Changeset::InsertApplication(NewApplication {
        chain_id: event.chain_id,
        round_id,
        id: params.recipient_id.to_string(),
        project_id: params.recipient_id.to_string(),
        status: ApplicationStatus::Pending,
        metadata_cid,
        metadata,
        created_at_block: event.block_number,
        updated_at_block: event.block_number,
    })])
}

/// `UpdatedRegistration`: an application was amended and re-enters review.
async fn updated_registration(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: RegisteredParams = decode_params(event)?;
    let round_id = processor
        .round_id_for_strategy(event.chain_id, &event.src_address)
        .await?;
    let (metadata_cid, metadata) = resolve_optional_metadata(processor, &params.metadata).await?;

    Ok(vec![Changeset::UpdateApplication {
        chain_id: event.chain_id,
        round_id,
        application_id: params.recipient_id.to_string(),
        update: ApplicationUpdate {
            status: Some(ApplicationStatus::Pending),
            metadata_cid,
            metadata,
            updated_at_block: Some(event.block_number),
        },
    }])
}

/// `TimestampsUpdated` for donation-voting: both windows move.
async fn donation_timestamps_updated(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: DonationTimestampsParams = decode_params(event)?;
    let round_id = processor
        .round_id_for_strategy(event.chain_id, &event.src_address)
        .await?;

    Ok(vec![Changeset::UpdateRound {
        chain_id: event.chain_id,
        round_id,
        update: RoundUpdate {
            applications_start_time: to_datetime(params.registration_start_time),
            applications_end_time: to_datetime(params.registration_end_time),
            donations_start_time: to_datetime(params.allocation_start_time),
            donations_end_time: to_datetime(params.allocation_end_time),
            updated_at_block: Some(event.block_number),
            ..RoundUpdate::default()
        },
    }])
}

/// `TimestampsUpdated` for direct grants lite: no donation window exists.
async fn direct_grants_timestamps_updated(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: DirectGrantsTimestampsParams = decode_params(event)?;
    let round_id = processor
        .round_id_for_strategy(event.chain_id, &event.src_address)
        .await?;

    Ok(vec![Changeset::UpdateRound {
        chain_id: event.chain_id,
        round_id,
        update: RoundUpdate {
            applications_start_time: to_datetime(params.registration_start_time),
            applications_end_time: to_datetime(params.registration_end_time),
            updated_at_block: Some(event.block_number),
            ..RoundUpdate::default()
        },
    }])
}

async fn resolve_optional_metadata(
    processor: &EventProcessor,
    pointer: &Option<MetadataPointer>,
) -> Result<(Option<String>, Option<serde_json::Value>), ProcessingError> {
    match pointer {
        Some(pointer) => Ok((
            Some(pointer.pointer.clone()),
            processor.resolve_metadata(pointer).await?,
        )),
        None => Ok((None, None)),
    }
}
