//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `vesta-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories` trait
//! - Individual repos: `PgEventLogRepository`, `PgCheckpointRepository`
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod checkpoint_repo;
mod database;
mod event_log_repo;
mod helpers;

pub use checkpoint_repo::PgCheckpointRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use event_log_repo::PgEventLogRepository;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use vesta_core::error::{StorageError, StorageResult};
use vesta_core::models::{Checkpoint, EventKey};
use vesta_core::ports::{CheckpointRepository, EventLogRepository, LogRecord, RETAINED_CHECKPOINTS, Repositories};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// This provides a single entry point for all storage operations and
/// implements atomic transactions that span both tables.
pub struct PgRepositories {
    db: Arc<Database>,
    event_log: PgEventLogRepository,
    checkpoints: PgCheckpointRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            event_log: PgEventLogRepository::new(pool.clone()),
            checkpoints: PgCheckpointRepository::new(pool),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn event_log(&self) -> &dyn EventLogRepository {
        &self.event_log
    }

    fn checkpoints(&self) -> &dyn CheckpointRepository {
        &self.checkpoints
    }

    async fn persist_batch_atomic(
        &self,
        records: &[LogRecord],
        checkpoint: Option<&Checkpoint>,
    ) -> StorageResult<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        for record in records {
            event_log_repo::upsert_record(&mut *tx, record).await?;
        }

        let mut pruned = 0;
        if let Some(checkpoint) = checkpoint {
            checkpoint_repo::save_checkpoint(&mut *tx, checkpoint).await?;
            pruned = checkpoint_repo::prune_checkpoints(&mut *tx, RETAINED_CHECKPOINTS).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        debug!(
            records = records.len(),
            checkpoint = checkpoint.is_some(),
            pruned,
            "Batch persisted"
        );

        Ok(())
    }

    async fn rollback_atomic(&self, boundary: EventKey) -> StorageResult<u64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Checkpoints first, then the records they were built from
        checkpoint_repo::delete_checkpoints_after(&mut *tx, boundary).await?;
        let removed = event_log_repo::delete_records_after(&mut *tx, boundary).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(removed)
    }
}
