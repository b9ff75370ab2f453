//! Line-oriented JSON feed reader.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument, warn};

use vesta_core::error::{FeedError, FeedResult};
use vesta_core::metrics::record_feed_decode_error;
use vesta_core::models::{EventKey, TxHash};
use vesta_core::ports::{EventSource, FeedItem, FeedStream, RawEvent, ResumePoint};

/// Default delay between polls for new lines in follow mode.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on events per delivered batch.
const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Configuration for the NDJSON feed.
#[derive(Debug, Clone)]
pub struct JsonLinesConfig {
    /// Path of the feed file.
    pub path: PathBuf,
    /// Keep waiting for appended lines at end of file.
    pub follow: bool,
    /// Delay between polls at end of file when following.
    pub poll_interval: Duration,
    /// Upper bound on events per batch.
    pub max_batch_size: usize,
}

impl JsonLinesConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }
}

/// One line of the feed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedRecord {
    Event(RawEvent),
    Rollback { block_number: u64, log_index: u32 },
}

/// NDJSON file adapter implementing the EventSource port.
///
/// Every subscription re-reads the file from the start. With a resume
/// point, the file is first replayed into the canonical chain (events
/// minus rolled-back tails) and delivery starts right after the first line
/// at which the chain's tip is that exact event. Everything after that
/// line is delivered, rollbacks included.
///
/// If the resume event never becomes the tip, delivery falls back to
/// skipping events by key and dropping the rollbacks seen while skipping.
pub struct JsonLinesSource {
    config: JsonLinesConfig,
}

impl JsonLinesSource {
    pub fn new(config: JsonLinesConfig) -> Self {
        Self { config }
    }

    async fn open(&self) -> FeedResult<FeedReader> {
        let file = File::open(&self.config.path)
            .await
            .map_err(|e| FeedError::OpenFailed(format!("{}: {}", self.config.path.display(), e)))?;

        Ok(FeedReader {
            reader: BufReader::new(file),
            source_id: self.source_id(),
            follow: self.config.follow,
            poll_interval: self.config.poll_interval,
            max_batch_size: self.config.max_batch_size.max(1),
            resume_after: None,
            quiet: false,
            line: 0,
            partial: String::new(),
            batch: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        })
    }
}

#[async_trait]
impl EventSource for JsonLinesSource {
    fn source_id(&self) -> String {
        format!("jsonl:{}", self.config.path.display())
    }

    #[instrument(skip(self), fields(path = %self.config.path.display()))]
    async fn subscribe(&self, from: Option<ResumePoint>) -> FeedResult<FeedStream> {
        let mut reader = self.open().await?;
        debug!(follow = self.config.follow, "📡 Feed opened");

        if let Some(point) = from {
            match reader.seek_past(point).await? {
                Some(line) => debug!(from = %point.key, tx = %point.tx_hash, line, "🔄 Resuming feed"),
                None => {
                    warn!(
                        from = %point.key,
                        tx = %point.tx_hash,
                        "⚠️  Resume event is not the chain tip anywhere in the feed, skipping by key"
                    );
                    reader = self.open().await?;
                    reader.resume_after = Some(point.key);
                }
            }
        }

        let stream = futures::stream::unfold(reader, |mut reader| async move {
            let item = reader.next_item().await?;
            Some((item, reader))
        });

        Ok(Box::pin(stream))
    }
}

// =============================================================================
// Reader state
// =============================================================================

struct FeedReader {
    reader: BufReader<File>,
    source_id: String,
    follow: bool,
    poll_interval: Duration,
    max_batch_size: usize,
    /// Set while skipping already-retained events by key.
    resume_after: Option<EventKey>,
    /// Suppress decode warnings for lines that are only being located.
    quiet: bool,
    /// 1-based number of the last consumed line.
    line: u64,
    /// Bytes of a line whose newline has not been written yet.
    partial: String,
    batch: Vec<RawEvent>,
    ready: VecDeque<FeedItem>,
    finished: bool,
}

impl FeedReader {
    async fn next_item(&mut self) -> Option<FeedResult<FeedItem>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }

            match self.read_record().await {
                Ok(Some(record)) => self.accept(record),
                Ok(None) => {
                    self.flush();
                    if !self.follow {
                        self.finished = true;
                    } else if self.ready.is_empty() {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Next decodable record, or `None` when no complete line is available.
    async fn read_record(&mut self) -> FeedResult<Option<FeedRecord>> {
        loop {
            self.reader
                .read_line(&mut self.partial)
                .await
                .map_err(|e| FeedError::ReadError(e.to_string()))?;

            if self.partial.is_empty() {
                return Ok(None);
            }
            // A followed file may still be mid-write
            if !self.partial.ends_with('\n') && self.follow {
                return Ok(None);
            }

            let text = std::mem::take(&mut self.partial);
            self.line += 1;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<FeedRecord>(text) {
                Ok(record) => return Ok(Some(record)),
                Err(_) if self.quiet => {}
                Err(e) => {
                    let err = FeedError::DecodeError {
                        line: self.line,
                        message: e.to_string(),
                    };
                    warn!(source = %self.source_id, error = %err, "⚠️  Skipping undecodable feed record");
                    record_feed_decode_error(&self.source_id);
                }
            }
        }
    }

    /// Consume lines until `point` is the tip of the canonical chain.
    ///
    /// Returns the line it became the tip at, or `None` once the available
    /// lines are exhausted without that happening.
    async fn seek_past(&mut self, point: ResumePoint) -> FeedResult<Option<u64>> {
        let mut chain: BTreeMap<EventKey, TxHash> = BTreeMap::new();
        self.quiet = true;
        let found = loop {
            match self.read_record().await {
                Ok(Some(FeedRecord::Event(raw))) => {
                    chain.insert(raw.key(), raw.tx_hash);
                }
                Ok(Some(FeedRecord::Rollback {
                    block_number,
                    log_index,
                })) => {
                    let boundary = EventKey::new(block_number, log_index);
                    chain.retain(|key, _| *key <= boundary);
                }
                Ok(None) => break Ok(None),
                Err(e) => break Err(e),
            }
            if chain.last_key_value() == Some((&point.key, &point.tx_hash)) {
                break Ok(Some(self.line));
            }
        };
        self.quiet = false;
        found
    }

    fn accept(&mut self, record: FeedRecord) {
        match record {
            FeedRecord::Event(raw) => {
                if let Some(from) = self.resume_after {
                    if raw.key() <= from {
                        return;
                    }
                    debug!(from = %from, resumed_at = %raw.key(), line = self.line, "🔄 Resuming feed");
                    self.resume_after = None;
                }

                let new_block = self
                    .batch
                    .first()
                    .is_some_and(|first| first.block_number != raw.block_number);
                if new_block || self.batch.len() >= self.max_batch_size {
                    self.flush();
                }
                self.batch.push(raw);
            }
            FeedRecord::Rollback {
                block_number,
                log_index,
            } => {
                if self.resume_after.is_some() {
                    return;
                }
                self.flush();
                self.ready
                    .push_back(FeedItem::Rollback(EventKey::new(block_number, log_index)));
            }
        }
    }

    fn flush(&mut self) {
        if !self.batch.is_empty() {
            self.ready.push_back(FeedItem::Events(std::mem::take(&mut self.batch)));
        }
    }
}
