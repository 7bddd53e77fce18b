//! Event types, queue and fetcher.
//!
//! # Components
//!
//! - [`types`]: ProcessorEvent envelope, identifier newtypes, EventKey
//! - [`queue`]: auto-resizing circular buffer for pending events
//! - [`fetcher`]: EventsFetcher port and GraphQL implementation

pub mod fetcher;
pub mod queue;
pub mod types;

pub use fetcher::{EventsFetcher, GraphqlEventsFetcher};
pub use queue::EventQueue;
pub use types::{Address, EventKey, ProcessorEvent, StrategyId, TransactionFields};
