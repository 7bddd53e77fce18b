//! Events fetcher port and GraphQL implementation.
//!
//! The fetcher pulls a page of raw events strictly after a cursor from the
//! external indexer service. An empty page is the normal "caught up to
//! chain head" condition, not an error; transport failures surface as
//! [`FetchError`] and the orchestrator retries after its polling delay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::events::types::{EventKey, ProcessorEvent};

/// Port delivering ordered pages of raw events.
#[async_trait]
pub trait EventsFetcher: Send + Sync {
    /// Fetches up to `limit` events strictly after `after` in
    /// `(block_number, log_index)` order, ascending.
    ///
    /// Pagination never re-fetches the checkpointed event: the coarse filter
    /// is `block_number >= after.block_number`, refined to strictly-greater
    /// `(block_number, log_index)` pairs.
    async fn fetch_events(
        &self,
        chain_id: u64,
        after: EventKey,
        limit: usize,
    ) -> Result<Vec<ProcessorEvent>, FetchError>;
}

/// GraphQL query for one page of events after a cursor.
const EVENTS_QUERY: &str = r"
query EventsAfter($chainId: Int!, $blockNumber: BigInt!, $logIndex: Int!, $limit: Int!) {
  events(
    filter: {
      chainId: { equalTo: $chainId }
      or: [
        { blockNumber: { greaterThan: $blockNumber } }
        {
          blockNumber: { equalTo: $blockNumber }
          logIndex: { greaterThan: $logIndex }
        }
      ]
    }
    orderBy: [BLOCK_NUMBER_ASC, LOG_INDEX_ASC]
    first: $limit
  ) {
    chainId
    contractName
    eventName
    blockNumber
    logIndex
    srcAddress
    params
    transactionFields {
      hash
      transactionIndex
      from
    }
  }
}
";

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: QueryVariables,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryVariables {
    chain_id: u64,
    block_number: u64,
    log_index: u64,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<EventsData>,
    #[serde(default)]
    errors: Vec<GraphqlErrorBody>,
}

#[derive(Debug, Deserialize)]
struct EventsData {
    events: Vec<ProcessorEvent>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorBody {
    message: String,
}

/// [`EventsFetcher`] backed by the indexer service's GraphQL endpoint.
pub struct GraphqlEventsFetcher {
    endpoint: String,
    client: reqwest::Client,
}

impl GraphqlEventsFetcher {
    /// Creates a fetcher for the given GraphQL endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventsFetcher for GraphqlEventsFetcher {
    async fn fetch_events(
        &self,
        chain_id: u64,
        after: EventKey,
        limit: usize,
    ) -> Result<Vec<ProcessorEvent>, FetchError> {
        let request = GraphqlRequest {
            query: EVENTS_QUERY,
            variables: QueryVariables {
                chain_id,
                block_number: after.block_number,
                log_index: after.log_index,
                limit,
            },
        };

        let response: GraphqlResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(FetchError::from)?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if !response.errors.is_empty() {
            let messages: Vec<String> =
                response.errors.into_iter().map(|e| e.message).collect();
            return Err(FetchError::Decode(messages.join("; ")));
        }

        let data = response
            .data
            .ok_or_else(|| FetchError::Decode("graphql response has no data".to_string()))?;
        Ok(data.events)
    }
}
