//! Shared index state: the single mutable resource.
//!
//! The indexer is the only writer and takes the write lock once per event,
//! so readers observe either the state before an event or after it.
//! Readers receive owned copies, never references into the live state.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{FeePolicy, PositionLedger, VaultAccountant};
use crate::models::{Aggregates, Checkpoint, IndexerStatus};

/// Everything derived from the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexState {
    pub ledger: PositionLedger,
    pub accountant: VaultAccountant,
    pub aggregates: Aggregates,
    pub status: IndexerStatus,
}

impl IndexState {
    /// Genesis state.
    pub fn new(policy: FeePolicy) -> Self {
        Self {
            ledger: PositionLedger::new(),
            accountant: VaultAccountant::new(policy),
            aggregates: Aggregates::default(),
            status: IndexerStatus::Running,
        }
    }

    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        Self {
            ledger: PositionLedger::from_parts(checkpoint.grants.clone(), checkpoint.accounts.clone()),
            accountant: VaultAccountant::with_state(checkpoint.policy, checkpoint.vault),
            aggregates: checkpoint.aggregates.clone(),
            status: IndexerStatus::Running,
        }
    }

    /// Snapshot for persistence; `None` until an event has been processed.
    pub fn to_checkpoint(&self) -> Option<Checkpoint> {
        let cursor = self.aggregates.last_processed?;
        Some(Checkpoint {
            cursor,
            policy: *self.accountant.policy(),
            vault: self.accountant.state(),
            grants: self.ledger.grants().cloned().collect(),
            accounts: self.ledger.accounts().cloned().collect(),
            aggregates: self.aggregates.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Cheaply clonable handle to the live [`IndexState`].
#[derive(Debug, Clone)]
pub struct SharedState(Arc<RwLock<IndexState>>);

impl SharedState {
    pub fn new(state: IndexState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.0.write()
    }

    /// Swap in a rebuilt state in one step.
    pub(crate) fn replace(&self, state: IndexState) {
        *self.0.write() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VestingSchedule;
    use crate::domain::ledger::Grant;
    use crate::models::{Address, EventKey, GrantId};

    #[test]
    fn checkpoint_roundtrip_restores_state() {
        let mut state = IndexState::new(FeePolicy::default());
        assert!(state.to_checkpoint().is_none());

        let grant = Grant::new(
            GrantId::new(1, 1),
            Address::from([1; 20]),
            1000,
            VestingSchedule::new(0, 900).unwrap(),
            EventKey::new(1, 0),
        );
        state.ledger.record_deposit(grant).unwrap();
        state.accountant.mint(1000).unwrap();
        state.aggregates.last_processed = Some(EventKey::new(1, 0));

        let checkpoint = state.to_checkpoint().unwrap();
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();

        assert_eq!(IndexState::from_checkpoint(&back), state);
    }

    #[test]
    fn replace_is_visible_to_other_handles() {
        let shared = SharedState::new(IndexState::new(FeePolicy::default()));
        let reader = shared.clone();

        let mut next = IndexState::new(FeePolicy::default());
        next.aggregates.applied_events = 3;
        shared.replace(next);

        assert_eq!(reader.read().aggregates.applied_events, 3);
    }
}
