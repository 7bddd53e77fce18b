//! Error taxonomy for the indexing pipeline.
//!
//! Errors fall into two families. Drops are permanently invalid or
//! unsupported inputs; they are logged and skipped, and the checkpoint moves
//! past them. Everything else is treated as transient infrastructure
//! failure: logged with event context, checkpoint withheld, retried after a
//! restart.

use crate::events::types::StrategyId;

/// Failures while talking to an external source (event service, RPC node,
/// IPFS gateway, price provider).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Failures while turning an event into changesets.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The event names a contract the pipeline does not know.
    #[error("unknown contract: {0}")]
    InvalidEvent(String),

    /// The contract is known but the event has no handler.
    #[error("no handler for event {contract}.{event}")]
    UnsupportedEvent {
        /// Contract name on the event.
        contract: String,
        /// Event name on the event.
        event: String,
    },

    /// The strategy id has no registered handler.
    #[error("unsupported strategy: {0}")]
    UnsupportedStrategy(StrategyId),

    /// The event required a strategy id but none was attached.
    #[error("missing strategy id for {contract}.{event}")]
    MissingStrategyId {
        /// Contract name on the event.
        contract: String,
        /// Event name on the event.
        event: String,
    },

    /// The event params do not decode into the handler's shape.
    #[error("invalid params for {event}: {reason}")]
    InvalidParams {
        /// Qualified `Contract.Event` name.
        event: String,
        /// What is wrong with the params.
        reason: String,
    },

    /// No round exists for the referenced strategy address or round id.
    #[error("round not found: {0}")]
    RoundNotFound(String),

    /// A collaborator port failed while resolving event context.
    #[error(transparent)]
    Port(#[from] FetchError),

    /// A repository read failed while resolving event context.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ProcessingError {
    /// Returns true if the event should be dropped rather than retried.
    ///
    /// Port and repository failures are transient; everything else means
    /// the event itself can never succeed.
    #[must_use]
    pub const fn is_drop(&self) -> bool {
        !matches!(self, Self::Port(_) | Self::Repository(_))
    }
}

/// Failures of the data loader as a whole (individual changeset failures
/// are reported inside `ExecutionResult` instead).
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The batch contains changeset kinds with no registered handler.
    #[error("unknown changeset types: {}", .0.join(", "))]
    UnknownChangesets(Vec<&'static str>),
}

/// Failures of a registry backing store.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backing store failed.
    #[error("registry storage error: {0}")]
    Storage(String),
}

/// Failures of the repository backing store.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The database rejected or lost the operation.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

/// Umbrella error for the orchestrator loop and binary boundary.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// See [`FetchError`].
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// See [`ProcessingError`].
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// See [`LoaderError`].
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// See [`RepositoryError`].
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Some changesets in a batch failed to apply.
    #[error("{failed} changeset(s) failed: {}", errors.join("; "))]
    PartialBatch {
        /// Number of failed changesets.
        failed: usize,
        /// Failure descriptions from the loader.
        errors: Vec<String>,
    },
}

impl IndexerError {
    /// Returns true if this error is an expected drop (warn level) rather
    /// than an infrastructure failure (error level).
    #[must_use]
    pub const fn is_expected_drop(&self) -> bool {
        matches!(self, Self::Processing(e) if e.is_drop())
    }
}
