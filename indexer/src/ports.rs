//! External collaborator ports consumed by the pipeline.
//!
//! The chain, metadata and pricing ports are consumed by the orchestrator
//! and the per-event handlers; their outputs are treated as opaque fields
//! embedded in changesets. Production implementations live here too: a
//! JSON-RPC chain client, an IPFS gateway metadata source, and a stand-in
//! price source.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha3::{Digest, Keccak256};

use crate::changeset::MetadataPointer;
use crate::error::FetchError;
use crate::events::types::{Address, StrategyId};

/// Metadata protocol number for IPFS.
const METADATA_PROTOCOL_IPFS: u64 = 1;

/// On-chain read port: resolves a strategy contract's self-reported id.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Reads `getStrategyId()` from the strategy contract.
    async fn get_strategy_id(&self, strategy_address: &Address)
        -> Result<StrategyId, FetchError>;
}

/// Metadata retrieval port.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Resolves a metadata pointer into a JSON document.
    ///
    /// Returns `Ok(None)` when the pointer is empty, uses an unknown
    /// protocol, or the document does not exist.
    async fn resolve(
        &self,
        pointer: &MetadataPointer,
    ) -> Result<Option<serde_json::Value>, FetchError>;
}

/// Token pricing port.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Converts a token amount into USD.
    async fn convert_to_usd(
        &self,
        chain_id: u64,
        token: &Address,
        amount: Decimal,
    ) -> Result<Decimal, FetchError>;
}

/// Returns the 4-byte call selector for a Solidity function signature.
fn call_selector(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

/// [`ChainClient`] backed by a JSON-RPC `eth_call` endpoint.
///
/// The `getStrategyId()` selector is derived with Keccak-256 at call time,
/// and the returned bytes32 becomes the strategy id.
pub struct RpcChainClient {
    endpoint: String,
    client: reqwest::Client,
}

impl RpcChainClient {
    /// Creates a client for the given RPC endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_strategy_id(
        &self,
        strategy_address: &Address,
    ) -> Result<StrategyId, FetchError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": strategy_address.as_str(), "data": call_selector("getStrategyId()") },
                "latest"
            ]
        });

        let response: RpcResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(FetchError::from)?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(FetchError::Transport(error.message));
        }

        let result = response
            .result
            .ok_or_else(|| FetchError::Decode("rpc response has no result".to_string()))?;

        decode_bytes32(&result).map(StrategyId::new)
    }
}

/// Extracts a bytes32 value (`0x` + 64 hex chars) from an `eth_call` result.
fn decode_bytes32(result: &str) -> Result<String, FetchError> {
    let hex = result
        .strip_prefix("0x")
        .ok_or_else(|| FetchError::Decode(format!("not a hex value: {result}")))?;
    if hex.len() < 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FetchError::Decode(format!("not a bytes32 value: {result}")));
    }
    let word: String = hex.chars().take(64).collect();
    Ok(format!("0x{word}"))
}

/// [`MetadataSource`] backed by an IPFS HTTP gateway.
pub struct IpfsMetadataSource {
    gateway_url: String,
    client: reqwest::Client,
}

impl IpfsMetadataSource {
    /// Creates a source for the given gateway base URL.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MetadataSource for IpfsMetadataSource {
    async fn resolve(
        &self,
        pointer: &MetadataPointer,
    ) -> Result<Option<serde_json::Value>, FetchError> {
        if pointer.protocol != METADATA_PROTOCOL_IPFS || pointer.pointer.is_empty() {
            return Ok(None);
        }

        let url = format!(
            "{}/ipfs/{}",
            self.gateway_url.trim_end_matches('/'),
            pointer.pointer
        );
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(FetchError::from)?;

        let document = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Some(document))
    }
}

/// [`PriceSource`] returning zero for every conversion.
///
/// Used when no pricing provider is configured; USD enrichment is
/// best-effort and zero means "unpriced".
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroPriceSource;

#[async_trait]
impl PriceSource for ZeroPriceSource {
    async fn convert_to_usd(
        &self,
        _chain_id: u64,
        _token: &Address,
        _amount: Decimal,
    ) -> Result<Decimal, FetchError> {
        Ok(Decimal::ZERO)
    }
}
