//! Port trait for the upstream event feed.
//!
//! The feed delivers raw vault events in batches and may signal a rollback
//! when the upstream chain reorganizes. Implementations live in the
//! infrastructure layer (e.g., `vesta-feed`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::FeedResult;
use crate::models::{EventId, EventKey, TxHash};

/// An undecoded event as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub block_number: u64,
    pub log_index: u32,
    pub tx_hash: TxHash,
    /// Block timestamp in seconds.
    pub block_timestamp: u64,
    /// Event variant name (`Deposited`, `Withdrawn`, `Redeemed`).
    pub name: String,
    /// Event fields as JSON.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RawEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.block_number, self.log_index)
    }

    pub fn id(&self) -> EventId {
        EventId {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}

/// One unit of feed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    /// Events to apply, in any order.
    Events(Vec<RawEvent>),
    /// Revert everything after this ordering key.
    Rollback(EventKey),
}

/// Where a subscription picks up: the last retained event.
///
/// The transaction hash pins the position to one inclusion of that key, so
/// a feed that replays a reorg can tell an abandoned event at the same key
/// from the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumePoint {
    pub key: EventKey,
    pub tx_hash: TxHash,
}

impl ResumePoint {
    pub fn of(event: &RawEvent) -> Self {
        Self {
            key: event.key(),
            tx_hash: event.tx_hash,
        }
    }
}

/// Stream of feed items.
pub type FeedStream = Pin<Box<dyn Stream<Item = FeedResult<FeedItem>> + Send>>;

/// Port trait for the event feed.
///
/// Subscribing again after an error must redeliver everything that follows
/// `from` in feed order, including rollbacks; duplicates are expected and
/// absorbed by the indexer.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable identifier for logs.
    fn source_id(&self) -> String;

    /// Subscribe to the feed after `from` (everything when `None`).
    async fn subscribe(&self, from: Option<ResumePoint>) -> FeedResult<FeedStream>;
}
