//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `vesta-storage`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::models::{Checkpoint, EventKey, EventStatus};

use super::event_source::RawEvent;

// =============================================================================
// Log Records
// =============================================================================

/// A retained event and its lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub raw: RawEvent,
    pub status: EventStatus,
}

impl LogRecord {
    pub fn pending(raw: RawEvent) -> Self {
        Self {
            raw,
            status: EventStatus::Pending,
        }
    }

    pub fn key(&self) -> EventKey {
        self.raw.key()
    }
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for the retained event log.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    /// Insert or replace records by ordering key.
    async fn upsert_records(&self, records: &[LogRecord]) -> StorageResult<()>;

    /// All records in ascending ordering-key order.
    async fn list_records(&self) -> StorageResult<Vec<LogRecord>>;

    /// Highest retained ordering key.
    async fn last_key(&self) -> StorageResult<Option<EventKey>>;

    /// Number of retained records.
    async fn count_records(&self) -> StorageResult<u64>;

    /// Delete records with key greater than `boundary`.
    async fn delete_after(&self, boundary: EventKey) -> StorageResult<u64>;
}

/// Repository for state checkpoints.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Checkpoint with the highest cursor.
    async fn latest_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;

    /// Store a checkpoint (upsert by cursor).
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Delete checkpoints whose cursor is greater than `boundary`.
    async fn delete_checkpoints_after(&self, boundary: EventKey) -> StorageResult<u64>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Checkpoints kept after each atomic batch; older ones are pruned.
///
/// More than one is kept so a rollback that drops the newest checkpoint
/// can still restore from an earlier one.
pub const RETAINED_CHECKPOINTS: usize = 3;

/// Combined repository access for the indexer.
///
/// This trait provides access to all individual repositories and
/// atomic operations that span multiple tables.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the event log repository.
    fn event_log(&self) -> &dyn EventLogRepository;

    /// Access the checkpoint repository.
    fn checkpoints(&self) -> &dyn CheckpointRepository;

    /// Persist changed log records and an optional checkpoint in one
    /// transaction. If any operation fails, everything is rolled back.
    ///
    /// When a checkpoint is written, all but the newest
    /// [`RETAINED_CHECKPOINTS`] are deleted in the same transaction.
    async fn persist_batch_atomic(
        &self,
        records: &[LogRecord],
        checkpoint: Option<&Checkpoint>,
    ) -> StorageResult<()>;

    /// Delete log records and checkpoints after `boundary` in one
    /// transaction. Returns the number of log records removed.
    async fn rollback_atomic(&self, boundary: EventKey) -> StorageResult<u64>;
}
