//! Typed vault events and their lifecycle status in the retained log.

use serde::{Deserialize, Serialize};

use crate::error::DiscardReason;

use super::{Address, EventId, EventKey, GrantId, TxHash};

/// A decoded vault event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// An fNFT grant was deposited and converted to vS.
    Deposited {
        grant_id: GrantId,
        owner: Address,
        total_value: u128,
        start_time: u64,
        maturation_time: u64,
    },
    /// Vested value was claimed out of a grant.
    Withdrawn { grant_id: GrantId, amount: u128 },
    /// vS was redeemed for the underlying asset.
    Redeemed {
        owner: Address,
        vs_amount: u128,
        asset_amount: u128,
        fee: u128,
    },
}

impl VaultEvent {
    pub const DEPOSITED: &'static str = "Deposited";
    pub const WITHDRAWN: &'static str = "Withdrawn";
    pub const REDEEMED: &'static str = "Redeemed";

    /// Event variant name as it appears in the feed.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposited { .. } => Self::DEPOSITED,
            Self::Withdrawn { .. } => Self::WITHDRAWN,
            Self::Redeemed { .. } => Self::REDEEMED,
        }
    }
}

/// A decoded event together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Ordering key.
    pub key: EventKey,
    /// Transaction that emitted the event.
    pub tx_hash: TxHash,
    /// Block timestamp in seconds; the clock for vesting and maturity.
    pub block_timestamp: u64,
    /// Decoded payload.
    pub event: VaultEvent,
}

impl LoggedEvent {
    /// Delivery identity (`tx_hash + log_index`).
    pub fn id(&self) -> EventId {
        EventId {
            tx_hash: self.tx_hash,
            log_index: self.key.log_index,
        }
    }
}

/// Lifecycle state of an event in the retained log.
///
/// `Pending -> Applied` or `Pending -> Discarded`; there is no other
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventStatus {
    /// Seen in the stream, not yet applied.
    Pending,
    /// State was mutated by this event.
    Applied,
    /// Failed validation; logged and skipped.
    Discarded { reason: DiscardReason },
}

impl EventStatus {
    /// Short label for storage and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Discarded { .. } => "discarded",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}
