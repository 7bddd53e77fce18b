//! Allo pool contract events.
//!
//! `PoolCreated` is the only event that needs the strategy id attached by
//! the orchestrator; it decides the round's strategy name at insert time.
//! Unknown strategy variants still get a round row with an empty name so
//! their funding history is not lost.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::changeset::{Changeset, MetadataPointer, NewRound, RoundUpdate};
use crate::error::ProcessingError;
use crate::events::types::{Address, ProcessorEvent, EVENT_POOL_CREATED};

use super::strategy::StrategyKind;
use super::{decode_params, parse_amount, unsupported, EventProcessor};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolCreatedParams {
    pool_id: String,
    profile_id: String,
    strategy: Address,
    token: Address,
    amount: String,
    metadata: MetadataPointer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolMetadataUpdatedParams {
    pool_id: String,
    metadata: MetadataPointer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolFundedParams {
    pool_id: String,
    amount: String,
}

/// Dispatches an Allo event to its handler.
pub(crate) async fn process(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    match event.event_name.as_str() {
        EVENT_POOL_CREATED => pool_created(processor, event).await,
        "PoolMetadataUpdated" => pool_metadata_updated(processor, event).await,
        "PoolFunded" => pool_funded(processor, event).await,
        _ => Err(unsupported(event)),
    }
}

/// `PoolCreated`: a new funding round backed by a strategy contract.
async fn pool_created(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: PoolCreatedParams = decode_params(event)?;
    let strategy_id =
        event
            .strategy_id
            .clone()
            .ok_or_else(|| ProcessingError::MissingStrategyId {
                contract: event.contract_name.clone(),
                event: event.event_name.clone(),
            })?;
    let strategy_name = StrategyKind::from_id(&strategy_id)
        .map(|kind| kind.name().to_string())
        .unwrap_or_default();

    let funded_amount = parse_amount(event, &params.amount)?;
    let funded_amount_in_usd = processor
        .convert_to_usd(event.chain_id, &params.token, funded_amount)
        .await?;
    let metadata = processor.resolve_metadata(&params.metadata).await?;

    Ok(vec![Changeset::InsertRound(NewRound {
        chain_id: event.chain_id,
        id: params.pool_id,
        project_id: params.profile_id,
        strategy_address: params.strategy,
        strategy_id,
        strategy_name,
        token: params.token,
        match_amount: Decimal::ZERO,
        funded_amount,
        funded_amount_in_usd,
        metadata_cid: Some(params.metadata.pointer),
        metadata,
        applications_start_time: None,
        applications_end_time: None,
        donations_start_time: None,
        donations_end_time: None,
        created_at_block: event.block_number,
        updated_at_block: event.block_number,
    })])
}

/// `PoolMetadataUpdated`: the round's metadata pointer moved.
async fn pool_metadata_updated(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: PoolMetadataUpdatedParams = decode_params(event)?;
    let metadata = processor.resolve_metadata(&params.metadata).await?;

    Ok(vec![Changeset::UpdateRound {
        chain_id: event.chain_id,
        round_id: params.pool_id,
        update: RoundUpdate {
            metadata_cid: Some(params.metadata.pointer),
            metadata,
            updated_at_block: Some(event.block_number),
            ..RoundUpdate::default()
        },
    }])
}

/// `PoolFunded`: tokens were added to the round's pot.
async fn pool_funded(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: PoolFundedParams = decode_params(event)?;
    let amount = parse_amount(event, &params.amount)?;
    let token = processor.round_token(event.chain_id, &params.pool_id).await?;
    let amount_in_usd = processor
        .convert_to_usd(event.chain_id, &token, amount)
        .await?;

    Ok(vec![Changeset::IncrementRoundFundedAmount {
        chain_id: event.chain_id,
        round_id: params.pool_id,
        amount,
        amount_in_usd,
    }])
}
