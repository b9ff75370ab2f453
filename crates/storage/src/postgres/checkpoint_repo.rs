//! Checkpoint repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};

use vesta_core::error::{StorageError, StorageResult};
use vesta_core::models::{Checkpoint, EventKey};
use vesta_core::ports::CheckpointRepository;

use super::helpers::key_columns;

/// PostgreSQL implementation of CheckpointRepository.
///
/// The full snapshot is stored as one JSONB body; only the cursor is
/// broken out into columns for ordering and rollback.
pub struct PgCheckpointRepository {
    pool: PgPool,
}

impl PgCheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointRepository for PgCheckpointRepository {
    async fn latest_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        let row: Option<(Json<Checkpoint>,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM checkpoints
            ORDER BY block_number DESC, log_index DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(|(body,)| body.0))
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        save_checkpoint(&self.pool, checkpoint).await
    }

    async fn delete_checkpoints_after(&self, boundary: EventKey) -> StorageResult<u64> {
        delete_checkpoints_after(&self.pool, boundary).await
    }
}

// =============================================================================
// Shared statements
// =============================================================================

pub(super) async fn save_checkpoint<'e, E: PgExecutor<'e>>(executor: E, checkpoint: &Checkpoint) -> StorageResult<()> {
    let (block_number, log_index) = key_columns(checkpoint.cursor)?;

    sqlx::query(
        r#"
        INSERT INTO checkpoints (block_number, log_index, body, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (block_number, log_index) DO UPDATE SET
            body = EXCLUDED.body,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(block_number)
    .bind(log_index)
    .bind(Json(checkpoint))
    .bind(checkpoint.created_at)
    .execute(executor)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

pub(super) async fn delete_checkpoints_after<'e, E: PgExecutor<'e>>(executor: E, boundary: EventKey) -> StorageResult<u64> {
    let (block_number, log_index) = key_columns(boundary)?;

    let result = sqlx::query("DELETE FROM checkpoints WHERE (block_number, log_index) > ($1, $2)")
        .bind(block_number)
        .bind(log_index)
        .execute(executor)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(result.rows_affected())
}

pub(super) async fn prune_checkpoints<'e, E: PgExecutor<'e>>(executor: E, keep: usize) -> StorageResult<u64> {
    let keep = i64::try_from(keep).map_err(|e| StorageError::QueryError(e.to_string()))?;

    let result = sqlx::query(
        r#"
        DELETE FROM checkpoints
        WHERE (block_number, log_index) NOT IN (
            SELECT block_number, log_index FROM checkpoints
            ORDER BY block_number DESC, log_index DESC
            LIMIT $1
        )
        "#,
    )
    .bind(keep)
    .execute(executor)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(result.rows_affected())
}
