//! Derived, recomputable aggregates maintained by the indexer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Address, EventKey, serde_amount};

/// Running protocol-wide sums.
///
/// Owned exclusively by the indexer; callers only ever receive copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregates {
    /// Total vS minted across all deposits.
    #[serde(with = "serde_amount")]
    pub minted_supply: u128,
    /// Total vS burned by redemptions.
    #[serde(with = "serde_amount")]
    pub redeemed_supply: u128,
    /// Fees retained on mint.
    #[serde(with = "serde_amount")]
    pub mint_fees: u128,
    /// Fees charged on redeem.
    #[serde(with = "serde_amount")]
    pub redeem_fees: u128,
    /// Face value of all deposited grants.
    #[serde(with = "serde_amount")]
    pub assets_deposited: u128,
    /// Underlying paid out to redeemers (net of fees).
    #[serde(with = "serde_amount")]
    pub assets_paid_out: u128,
    /// Value claimed out of grants.
    #[serde(with = "serde_amount")]
    pub claimed_value: u128,
    /// Grants with value still locked.
    pub open_grants: u64,
    /// Grants fully claimed.
    pub closed_grants: u64,
    /// Events that mutated state.
    pub applied_events: u64,
    /// Events rejected and skipped.
    pub discarded_events: u64,
    /// Discard counts keyed by reason code.
    pub discarded_by_reason: BTreeMap<String, u64>,
    /// Ordering key of the last event that left `Pending`.
    pub last_processed: Option<EventKey>,
    /// Block timestamp of the last processed event.
    pub last_block_timestamp: Option<u64>,
}

impl Aggregates {
    /// Record a discarded event under its reason code.
    pub fn record_discard(&mut self, code: &str) {
        self.discarded_events += 1;
        *self.discarded_by_reason.entry(code.to_string()).or_default() += 1;
    }

    /// Net outstanding supply according to the running sums.
    pub fn outstanding_supply(&self) -> u128 {
        self.minted_supply.saturating_sub(self.redeemed_supply)
    }
}

/// Per-account activity derived from deposits, claims and redemptions.
///
/// vS is transferable outside the indexed events, so these are activity
/// totals rather than balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    pub owner: Address,
    /// Grants ever deposited by this account.
    pub grants: u64,
    #[serde(with = "serde_amount")]
    pub deposited: u128,
    #[serde(with = "serde_amount")]
    pub minted: u128,
    #[serde(with = "serde_amount")]
    pub claimed: u128,
    #[serde(with = "serde_amount")]
    pub redeemed: u128,
    #[serde(with = "serde_amount")]
    pub assets_received: u128,
    #[serde(with = "serde_amount")]
    pub redeem_fees_paid: u128,
}

impl AccountPosition {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            grants: 0,
            deposited: 0,
            minted: 0,
            claimed: 0,
            redeemed: 0,
            assets_received: 0,
            redeem_fees_paid: 0,
        }
    }
}

/// Whether the indexer is accepting writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexerStatus {
    /// Applying events normally.
    #[default]
    Running,
    /// A fatal error stopped mutation; reads serve the last good state.
    Halted {
        reason: String,
        at: Option<EventKey>,
    },
}

impl IndexerStatus {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}
