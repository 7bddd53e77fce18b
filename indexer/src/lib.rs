//! Allo protocol event indexer.
//!
//! Consumes ordered on-chain events for the Allo grants protocol (profile
//! registry, pool contract, strategy contracts), enriches them with
//! strategy ids read from the chain, maps them into repository changesets,
//! and applies those to Postgres behind a monotonic checkpoint.
//!
//! # Components
//!
//! - [`events`]: event envelope, ordering key, queue, fetcher port
//! - [`processor`]: per-contract event handlers producing changesets
//! - [`changeset`]: the repository mutation vocabulary
//! - [`loader`]: validated, early-stopping changeset application
//! - [`registry`]: strategy-id cache and checkpoint store
//! - [`repository`]: Postgres persistence behind an async port
//! - [`ports`]: chain, metadata and pricing collaborators
//! - [`orchestrator`]: the fetch/enrich/process/load/checkpoint loop
//! - [`metrics`]: pipeline counters
//! - [`config`]: environment-driven runtime settings
//! - [`error`]: the error taxonomy

pub mod changeset;
pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod metrics;
pub mod orchestrator;
pub mod ports;
pub mod processor;
pub mod registry;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use changeset::{Changeset, ChangesetKind};
pub use config::{ConfigError, IndexerConfig};
pub use error::IndexerError;
pub use events::{Address, EventKey, EventQueue, EventsFetcher, ProcessorEvent, StrategyId};
pub use loader::{DataLoader, ExecutionResult};
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use orchestrator::{EventOutcome, Orchestrator, ShutdownSignal};
pub use processor::{EventProcessor, StrategyKind};
pub use registry::{EventsRegistry, StrategyRegistry};
pub use repository::Repository;
