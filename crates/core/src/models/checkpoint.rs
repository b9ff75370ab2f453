//! Persisted snapshot of the full index state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountPosition, Aggregates, EventKey};
use crate::domain::{FeePolicy, Grant, VaultState};

/// Index state as of `cursor`, plus the policy it was computed under.
///
/// Restoring from a checkpoint and re-applying the retained log records
/// after `cursor` yields the same state as a full replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last event folded into this state.
    pub cursor: EventKey,
    pub policy: FeePolicy,
    pub vault: VaultState,
    pub grants: Vec<Grant>,
    pub accounts: Vec<AccountPosition>,
    pub aggregates: Aggregates,
    pub created_at: DateTime<Utc>,
}
