//! Event log repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use vesta_core::error::{StorageError, StorageResult};
use vesta_core::models::EventKey;
use vesta_core::ports::{EventLogRepository, LogRecord, RawEvent};

use super::helpers::{bytes_to_tx_hash, key_columns, key_from_columns, status_from_columns, status_to_columns, to_i64, to_u64};

/// PostgreSQL implementation of EventLogRepository.
pub struct PgEventLogRepository {
    pool: PgPool,
}

impl PgEventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    async fn upsert_records(&self, records: &[LogRecord]) -> StorageResult<()> {
        for record in records {
            upsert_record(&self.pool, record).await?;
        }
        Ok(())
    }

    async fn list_records(&self) -> StorageResult<Vec<LogRecord>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT block_number, log_index, tx_hash, block_timestamp, name, data, status, discard_reason
            FROM event_log
            ORDER BY block_number ASC, log_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(LogRow::into_record).collect()
    }

    async fn last_key(&self) -> StorageResult<Option<EventKey>> {
        let row: Option<(i64, i32)> = sqlx::query_as(
            r#"
            SELECT block_number, log_index
            FROM event_log
            ORDER BY block_number DESC, log_index DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(|(block, index)| key_from_columns(block, index)).transpose()
    }

    async fn count_records(&self) -> StorageResult<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        to_u64(count.0, "event_log.count")
    }

    async fn delete_after(&self, boundary: EventKey) -> StorageResult<u64> {
        delete_records_after(&self.pool, boundary).await
    }
}

// =============================================================================
// Shared statements
// =============================================================================

/// Insert or replace one record by ordering key.
pub(super) async fn upsert_record<'e, E: PgExecutor<'e>>(executor: E, record: &LogRecord) -> StorageResult<()> {
    let (block_number, log_index) = key_columns(record.key())?;
    let (status, discard_reason) = status_to_columns(&record.status)?;

    sqlx::query(
        r#"
        INSERT INTO event_log (
            block_number, log_index, tx_hash, block_timestamp, name, data,
            status, discard_reason, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
        ON CONFLICT (block_number, log_index) DO UPDATE SET
            tx_hash = EXCLUDED.tx_hash,
            block_timestamp = EXCLUDED.block_timestamp,
            name = EXCLUDED.name,
            data = EXCLUDED.data,
            status = EXCLUDED.status,
            discard_reason = EXCLUDED.discard_reason,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(block_number)
    .bind(log_index)
    .bind(&record.raw.tx_hash.as_bytes()[..])
    .bind(to_i64(record.raw.block_timestamp, "block_timestamp")?)
    .bind(&record.raw.name)
    .bind(&record.raw.data)
    .bind(status)
    .bind(discard_reason)
    .execute(executor)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Delete records strictly after `boundary`.
pub(super) async fn delete_records_after<'e, E: PgExecutor<'e>>(executor: E, boundary: EventKey) -> StorageResult<u64> {
    let (block_number, log_index) = key_columns(boundary)?;

    let result = sqlx::query("DELETE FROM event_log WHERE (block_number, log_index) > ($1, $2)")
        .bind(block_number)
        .bind(log_index)
        .execute(executor)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct LogRow {
    block_number: i64,
    log_index: i32,
    tx_hash: Vec<u8>,
    block_timestamp: i64,
    name: String,
    data: serde_json::Value,
    status: String,
    discard_reason: Option<serde_json::Value>,
}

impl LogRow {
    fn into_record(self) -> StorageResult<LogRecord> {
        let key = key_from_columns(self.block_number, self.log_index)?;
        Ok(LogRecord {
            raw: RawEvent {
                block_number: key.block_number,
                log_index: key.log_index,
                tx_hash: bytes_to_tx_hash(self.tx_hash, "event_log.tx_hash")?,
                block_timestamp: to_u64(self.block_timestamp, "event_log.block_timestamp")?,
                name: self.name,
                data: self.data,
            },
            status: status_from_columns(&self.status, self.discard_reason)?,
        })
    }
}
