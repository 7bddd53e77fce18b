//! Indexer configuration.
//!
//! Read once at startup from the environment, validated before anything is
//! wired up. All knobs also have builder-style setters so tests and embedded
//! usage can construct configs directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default page size for event fetches.
pub const DEFAULT_FETCH_LIMIT: usize = 500;

/// Default delay after an empty or failed fetch, in milliseconds.
pub const DEFAULT_FETCH_DELAY_MS: u64 = 1_000;

/// Default public IPFS gateway.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    /// A value parsed but fails validation.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Name of the offending setting.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Runtime settings for one indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Chain to index.
    pub chain_id: u64,
    /// Postgres connection string.
    pub database_url: String,
    /// GraphQL endpoint of the event source.
    pub graphql_endpoint: String,
    /// JSON-RPC endpoint for on-chain reads.
    pub rpc_endpoint: String,
    /// IPFS gateway base URL.
    pub ipfs_gateway: String,
    /// Page size for event fetches.
    pub fetch_limit: usize,
    /// Delay after an empty or failed fetch, in milliseconds.
    pub fetch_delay_ms: u64,
}

impl IndexerConfig {
    /// Creates a config with default tuning knobs.
    #[must_use]
    pub fn new(
        chain_id: u64,
        database_url: impl Into<String>,
        graphql_endpoint: impl Into<String>,
        rpc_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            database_url: database_url.into(),
            graphql_endpoint: graphql_endpoint.into(),
            rpc_endpoint: rpc_endpoint.into(),
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            fetch_delay_ms: DEFAULT_FETCH_DELAY_MS,
        }
    }

    /// Reads the config from the environment.
    ///
    /// Required: `CHAIN_ID`, `DATABASE_URL`, `GRAPHQL_ENDPOINT`,
    /// `RPC_ENDPOINT`. Optional: `IPFS_GATEWAY`, `FETCH_LIMIT`,
    /// `FETCH_DELAY_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on missing variables, unparseable numbers, or
    /// failed validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chain_id = parse_env("CHAIN_ID", require_env("CHAIN_ID")?)?;
        let mut config = Self::new(
            chain_id,
            require_env("DATABASE_URL")?,
            require_env("GRAPHQL_ENDPOINT")?,
            require_env("RPC_ENDPOINT")?,
        );
        if let Ok(gateway) = std::env::var("IPFS_GATEWAY") {
            config.ipfs_gateway = gateway;
        }
        if let Ok(limit) = std::env::var("FETCH_LIMIT") {
            config.fetch_limit = parse_env("FETCH_LIMIT", limit)?;
        }
        if let Ok(delay) = std::env::var("FETCH_DELAY_MS") {
            config.fetch_delay_ms = parse_env("FETCH_DELAY_MS", delay)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the fetch page size.
    #[must_use]
    pub const fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    /// Sets the post-empty-fetch delay in milliseconds.
    #[must_use]
    pub const fn with_fetch_delay_ms(mut self, fetch_delay_ms: u64) -> Self {
        self.fetch_delay_ms = fetch_delay_ms;
        self
    }

    /// Sets the IPFS gateway base URL.
    #[must_use]
    pub fn with_ipfs_gateway(mut self, ipfs_gateway: impl Into<String>) -> Self {
        self.ipfs_gateway = ipfs_gateway.into();
        self
    }

    /// Returns the post-empty-fetch delay.
    #[must_use]
    pub const fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    /// Checks the config for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id == 0 {
            return Err(invalid("chain_id", "must be non-zero"));
        }
        if self.fetch_limit == 0 {
            return Err(invalid("fetch_limit", "must be non-zero"));
        }
        if self.database_url.is_empty() {
            return Err(invalid("database_url", "must not be empty"));
        }
        if self.graphql_endpoint.is_empty() {
            return Err(invalid("graphql_endpoint", "must not be empty"));
        }
        if self.rpc_endpoint.is_empty() {
            return Err(invalid("rpc_endpoint", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.to_string(),
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        reason: e.to_string(),
    })
}
