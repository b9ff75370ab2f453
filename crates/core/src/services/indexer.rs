//! Indexer service - drives the event indexer from the feed.
//!
//! The service owns the [`EventIndexer`], subscribes to the feed from the
//! last retained event and persists what each batch changed. Transient feed
//! and storage failures are retried; fatal indexer errors stop the loop
//! while the shared state stays readable.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use super::event_indexer::{EventIndexer, IndexerSettings};
use super::query::QueryService;
use crate::error::{IndexerError, IndexerResult};
use crate::models::{EventKey, IndexerStatus};
use crate::ports::{EventSource, FeedItem, LogRecord, RawEvent, Repositories};

/// Initial reconnect delay.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Reconnect delay ceiling.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the indexer service.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// How events are applied.
    pub settings: IndexerSettings,
    /// Applied events between checkpoints (0 disables periodic checkpoints).
    pub checkpoint_interval: u64,
    /// Write a checkpoint on graceful shutdown.
    pub final_checkpoint: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            settings: IndexerSettings::default(),
            checkpoint_interval: 1_000,
            final_checkpoint: true,
        }
    }
}

// =============================================================================
// IndexerService
// =============================================================================

/// Main indexer service.
///
/// # Flow
///
/// 1. Restore the indexer from the latest checkpoint and the retained log
/// 2. Subscribe to the feed after the last retained key
/// 3. Ingest each batch and persist changed log records atomically
/// 4. On a rollback signal, rebuild state and truncate storage
/// 5. Checkpoint every `checkpoint_interval` applied events
pub struct IndexerService<S: EventSource, R: Repositories> {
    config: IndexerConfig,
    source: Arc<S>,
    repositories: Arc<R>,
    indexer: EventIndexer,
    /// Lowest rollback boundary not yet applied to storage.
    pending_truncate: Option<EventKey>,
    applied_since_checkpoint: u64,
}

impl<S: EventSource, R: Repositories> IndexerService<S, R> {
    /// Restore the indexer from storage.
    #[instrument(skip_all)]
    pub async fn bootstrap(config: IndexerConfig, source: Arc<S>, repositories: Arc<R>) -> IndexerResult<Self> {
        let checkpoint = repositories.checkpoints().latest_checkpoint().await?;
        let records = repositories.event_log().list_records().await?;
        debug!(
            records = records.len(),
            checkpoint = ?checkpoint.as_ref().map(|c| c.cursor),
            "Loaded persisted state"
        );

        let indexer = EventIndexer::restore(config.settings, checkpoint, records)?;

        Ok(Self {
            config,
            source,
            repositories,
            indexer,
            pending_truncate: None,
            applied_since_checkpoint: 0,
        })
    }

    /// Read handle over the live state.
    pub fn query(&self) -> QueryService {
        self.indexer.query()
    }

    /// Start the indexer.
    ///
    /// Returns `ShutdownRequested` after a graceful stop, or the fatal error
    /// that halted indexing.
    #[instrument(skip_all, fields(source = %self.source.source_id()))]
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) -> IndexerResult<()> {
        info!(policy = %self.config.settings.policy, "⛓️  Starting indexer");

        if let IndexerStatus::Halted { reason, .. } = self.indexer.status() {
            error!(reason = %reason, "❌ Indexer restored in halted state");
            return Err(IndexerError::Halted(reason));
        }

        let mut retry_delay = INITIAL_RETRY_DELAY;

        loop {
            if *shutdown_rx.borrow() {
                return self.shutdown().await;
            }

            let from = self.indexer.resume_point();
            match self.source.subscribe(from).await {
                Ok(mut stream) => {
                    debug!(from = ?from, "📡 Subscription established");
                    retry_delay = INITIAL_RETRY_DELAY;

                    loop {
                        tokio::select! {
                            biased;
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    return self.shutdown().await;
                                }
                            }
                            item = stream.next() => match item {
                                Some(Ok(FeedItem::Events(batch))) => self.handle_batch(batch).await?,
                                Some(Ok(FeedItem::Rollback(boundary))) => self.handle_rollback(boundary).await?,
                                Some(Err(e)) => {
                                    warn!(error = %e, "⚠️  Feed error, reconnecting...");
                                    break;
                                }
                                None => {
                                    debug!("Feed ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_ms = retry_delay.as_millis(),
                        "⚠️  Failed to subscribe, retrying..."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {
                    debug!(retry_delay_ms = retry_delay.as_millis(), "🔄 Reconnecting to feed...");
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return self.shutdown().await;
                    }
                }
            }
        }
    }

    /// Ingest a batch, persist its effects, and surface fatal errors.
    #[instrument(skip_all, fields(events = batch.len()))]
    async fn handle_batch(&mut self, batch: Vec<RawEvent>) -> IndexerResult<()> {
        let result = self.indexer.ingest(batch);

        if let Ok(report) = &result {
            self.applied_since_checkpoint += report.applied;
            if report.applied + report.discarded > 0 {
                info!(
                    applied = report.applied,
                    discarded = report.discarded,
                    duplicates = report.duplicates,
                    last = ?self.indexer.last_key(),
                    "⛓️  Events indexed"
                );
            } else {
                trace!(duplicates = report.duplicates, "Batch fully deduplicated");
            }
        }

        let checkpoint_due = self.config.checkpoint_interval > 0
            && self.applied_since_checkpoint >= self.config.checkpoint_interval;
        self.persist(checkpoint_due).await;

        result.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn handle_rollback(&mut self, boundary: EventKey) -> IndexerResult<()> {
        warn!(boundary = %boundary, "🔄 Rollback signalled by feed");
        self.pending_truncate = Some(match self.pending_truncate {
            Some(existing) => existing.min(boundary),
            None => boundary,
        });

        let result = self.indexer.rollback(boundary);
        self.persist(false).await;
        result.map(|_| ())
    }

    /// Flush pending truncation, dirty records and an optional checkpoint.
    ///
    /// Storage failures are logged and retried on the next call; the dirty
    /// set is only cleared once a write succeeds.
    async fn persist(&mut self, with_checkpoint: bool) {
        if let Some(boundary) = self.pending_truncate {
            match self.repositories.rollback_atomic(boundary).await {
                Ok(deleted) => {
                    info!(boundary = %boundary, deleted, "🗑️  Persisted events rolled back");
                    self.pending_truncate = None;
                }
                Err(e) => {
                    error!(error = %e, boundary = %boundary, "❌ Failed to roll back storage, will retry");
                    return;
                }
            }
        }

        let records = self.indexer.dirty_records();
        let checkpoint = if with_checkpoint {
            self.indexer.checkpoint()
        } else {
            None
        };
        if records.is_empty() && checkpoint.is_none() {
            return;
        }

        match self
            .repositories
            .persist_batch_atomic(&records, checkpoint.as_ref())
            .await
        {
            Ok(()) => {
                let keys: Vec<EventKey> = records.iter().map(LogRecord::key).collect();
                self.indexer.mark_persisted(&keys);
                if let Some(cp) = &checkpoint {
                    debug!(cursor = %cp.cursor, "💾 Checkpoint written");
                    self.applied_since_checkpoint = 0;
                }
                trace!(records = records.len(), "Batch persisted");
            }
            Err(e) => {
                error!(error = %e, records = records.len(), "❌ Failed to persist batch, will retry");
            }
        }
    }

    async fn shutdown(&mut self) -> IndexerResult<()> {
        debug!("Shutdown requested");
        self.persist(self.config.final_checkpoint).await;
        Err(IndexerError::ShutdownRequested)
    }
}

// =============================================================================
// Tests
// =============================================================================
