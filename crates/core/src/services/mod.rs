//! Indexing and query services.
//!
//! - [`EventIndexer`] - Synchronous core: ordering, dedup, apply, replay
//! - [`IndexerService`] - Async driver over an [`EventSource`](crate::ports::EventSource)
//! - [`QueryService`] - Read-only snapshots for API callers

mod decode;
mod event_indexer;
mod indexer;
mod query;
mod state;

pub use decode::decode;
pub use event_indexer::{EventIndexer, IndexerSettings, IngestReport, RollbackReport};
pub use indexer::{IndexerConfig, IndexerService};
pub use query::{GrantView, QueryService, Snapshot, VaultView};
pub use state::{IndexState, SharedState};
