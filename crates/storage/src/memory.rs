//! In-memory repositories for tests and database-less runs.
//!
//! Implements the same ports as the PostgreSQL adapter. Both tables sit
//! behind one lock, so the atomic operations are atomic by construction.
//! All data is lost on process termination.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use vesta_core::error::StorageResult;
use vesta_core::models::{Checkpoint, EventKey};
use vesta_core::ports::{CheckpointRepository, EventLogRepository, LogRecord, RETAINED_CHECKPOINTS, Repositories};

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<EventKey, LogRecord>,
    checkpoints: BTreeMap<EventKey, Checkpoint>,
}

impl Tables {
    fn delete_records_after(&mut self, boundary: EventKey) -> u64 {
        let removed = self.records.split_off(&after(boundary));
        removed.len() as u64
    }

    fn delete_checkpoints_after(&mut self, boundary: EventKey) -> u64 {
        let removed = self.checkpoints.split_off(&after(boundary));
        removed.len() as u64
    }

    fn prune_checkpoints(&mut self, keep: usize) {
        while self.checkpoints.len() > keep {
            self.checkpoints.pop_first();
        }
    }
}

/// Smallest key strictly greater than `key`.
fn after(key: EventKey) -> EventKey {
    match key.log_index.checked_add(1) {
        Some(index) => EventKey::new(key.block_number, index),
        None => EventKey::new(key.block_number.saturating_add(1), 0),
    }
}

/// Thread-safe in-memory implementation of every repository port.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRepositories {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogRepository for InMemoryRepositories {
    async fn upsert_records(&self, records: &[LogRecord]) -> StorageResult<()> {
        let mut tables = self.tables.write();
        for record in records {
            tables.records.insert(record.key(), record.clone());
        }
        Ok(())
    }

    async fn list_records(&self) -> StorageResult<Vec<LogRecord>> {
        Ok(self.tables.read().records.values().cloned().collect())
    }

    async fn last_key(&self) -> StorageResult<Option<EventKey>> {
        Ok(self.tables.read().records.keys().next_back().copied())
    }

    async fn count_records(&self) -> StorageResult<u64> {
        Ok(self.tables.read().records.len() as u64)
    }

    async fn delete_after(&self, boundary: EventKey) -> StorageResult<u64> {
        Ok(self.tables.write().delete_records_after(boundary))
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryRepositories {
    async fn latest_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        Ok(self.tables.read().checkpoints.values().next_back().cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.tables
            .write()
            .checkpoints
            .insert(checkpoint.cursor, checkpoint.clone());
        Ok(())
    }

    async fn delete_checkpoints_after(&self, boundary: EventKey) -> StorageResult<u64> {
        Ok(self.tables.write().delete_checkpoints_after(boundary))
    }
}

#[async_trait]
impl Repositories for InMemoryRepositories {
    fn event_log(&self) -> &dyn EventLogRepository {
        self
    }

    fn checkpoints(&self) -> &dyn CheckpointRepository {
        self
    }

    async fn persist_batch_atomic(
        &self,
        records: &[LogRecord],
        checkpoint: Option<&Checkpoint>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        for record in records {
            tables.records.insert(record.key(), record.clone());
        }
        if let Some(checkpoint) = checkpoint {
            tables.checkpoints.insert(checkpoint.cursor, checkpoint.clone());
            tables.prune_checkpoints(RETAINED_CHECKPOINTS);
        }
        Ok(())
    }

    async fn rollback_atomic(&self, boundary: EventKey) -> StorageResult<u64> {
        let mut tables = self.tables.write();
        tables.delete_checkpoints_after(boundary);
        Ok(tables.delete_records_after(boundary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_core::domain::FeePolicy;
    use vesta_core::models::{EventStatus, TxHash};
    use vesta_core::ports::RawEvent;
    use vesta_core::services::IndexState;

    fn record(block: u64, index: u32) -> LogRecord {
        LogRecord::pending(RawEvent {
            block_number: block,
            log_index: index,
            tx_hash: TxHash::from([block as u8; 32]),
            block_timestamp: block * 12,
            name: "Deposited".to_string(),
            data: serde_json::Value::Null,
        })
    }

    fn checkpoint_at(key: EventKey) -> Checkpoint {
        let mut state = IndexState::new(FeePolicy::default());
        state.aggregates.last_processed = Some(key);
        state.to_checkpoint().unwrap()
    }

    // Test critique: les enregistrements sont toujours listés dans l'ordre de la chaîne
    #[tokio::test]
    async fn test_records_listed_in_key_order() {
        let repos = InMemoryRepositories::new();
        repos
            .upsert_records(&[record(3, 0), record(1, 1), record(1, 0)])
            .await
            .unwrap();

        let keys: Vec<EventKey> = repos.list_records().await.unwrap().iter().map(LogRecord::key).collect();
        assert_eq!(keys, vec![EventKey::new(1, 0), EventKey::new(1, 1), EventKey::new(3, 0)]);
        assert_eq!(repos.last_key().await.unwrap(), Some(EventKey::new(3, 0)));
        assert_eq!(repos.count_records().await.unwrap(), 3);
    }

    // Test critique: un upsert remplace le statut sans dupliquer l'enregistrement
    #[tokio::test]
    async fn test_upsert_replaces_status() {
        let repos = InMemoryRepositories::new();
        repos.upsert_records(&[record(1, 0)]).await.unwrap();

        let mut applied = record(1, 0);
        applied.status = EventStatus::Applied;
        repos.persist_batch_atomic(&[applied], None).await.unwrap();

        let records = repos.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EventStatus::Applied);
    }

    // Test critique: le rollback garde la borne et supprime tout ce qui suit
    #[tokio::test]
    async fn test_rollback_keeps_boundary() {
        let repos = InMemoryRepositories::new();
        repos
            .persist_batch_atomic(
                &[record(1, 0), record(2, 0), record(2, 1), record(3, 0)],
                Some(&checkpoint_at(EventKey::new(1, 0))),
            )
            .await
            .unwrap();
        repos.save_checkpoint(&checkpoint_at(EventKey::new(3, 0))).await.unwrap();

        let removed = repos.rollback_atomic(EventKey::new(2, 0)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repos.last_key().await.unwrap(), Some(EventKey::new(2, 0)));

        let latest = repos.latest_checkpoint().await.unwrap().unwrap();
        assert_eq!(latest.cursor, EventKey::new(1, 0));
    }

    // Test critique: les checkpoints ne s'accumulent pas sans limite
    #[tokio::test]
    async fn test_batches_prune_old_checkpoints() {
        let repos = InMemoryRepositories::new();
        for block in 1..=10u64 {
            repos
                .persist_batch_atomic(&[record(block, 0)], Some(&checkpoint_at(EventKey::new(block, 0))))
                .await
                .unwrap();
        }
        // A batch without a checkpoint leaves retention alone.
        repos.persist_batch_atomic(&[record(11, 0)], None).await.unwrap();

        let cursors: Vec<EventKey> = repos.tables.read().checkpoints.keys().copied().collect();
        assert_eq!(cursors.len(), RETAINED_CHECKPOINTS);
        assert_eq!(cursors.last(), Some(&EventKey::new(10, 0)));
        assert_eq!(cursors.first(), Some(&EventKey::new(11 - RETAINED_CHECKPOINTS as u64, 0)));
        assert_eq!(repos.count_records().await.unwrap(), 11);

        // A rollback past the newest checkpoint still finds an older one.
        repos.rollback_atomic(EventKey::new(9, 0)).await.unwrap();
        let latest = repos.latest_checkpoint().await.unwrap().unwrap();
        assert_eq!(latest.cursor, EventKey::new(9, 0));
    }

    // Test critique: la clé maximale ne provoque pas de débordement
    #[test]
    fn test_after_handles_max_log_index() {
        assert_eq!(after(EventKey::new(4, u32::MAX)), EventKey::new(5, 0));
        assert_eq!(after(EventKey::new(4, 7)), EventKey::new(4, 8));
    }
}
