//! Read-only query surface over the shared index state.
//!
//! Every method takes the read lock once and returns owned data, so a
//! result is always a consistent snapshot taken between two events.

use serde::Serialize;

use super::state::SharedState;
use crate::domain::{FeePolicy, Grant, VaultState};
use crate::models::{AccountPosition, Address, Aggregates, GrantId, IndexerStatus, serde_amount};
use crate::ports::{Connection, Cursor, Pagination};

// =============================================================================
// Views
// =============================================================================

/// A grant with vesting projections evaluated at `at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantView {
    #[serde(flatten)]
    pub grant: Grant,
    /// Timestamp the projections were evaluated at.
    pub at: u64,
    /// WAD-scaled.
    #[serde(with = "serde_amount")]
    pub claimable_fraction: u128,
    /// WAD-scaled.
    #[serde(with = "serde_amount")]
    pub penalty_fraction: u128,
    #[serde(with = "serde_amount")]
    pub vested: u128,
    #[serde(with = "serde_amount")]
    pub projected_claimable: u128,
}

impl GrantView {
    fn project(grant: &Grant, at: u64) -> Self {
        Self {
            grant: grant.clone(),
            at,
            claimable_fraction: grant.schedule.claimable_fraction(at),
            penalty_fraction: grant.schedule.penalty_fraction(at),
            vested: grant.vested(at),
            projected_claimable: grant.projected_claimable(at),
        }
    }
}

/// Vault totals with the derived ratio and the policy in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultView {
    #[serde(flatten)]
    pub state: VaultState,
    /// WAD-scaled.
    #[serde(with = "serde_amount")]
    pub backing_ratio: u128,
    pub policy: FeePolicy,
}

/// Vault, aggregates and status read under one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub vault: VaultView,
    pub aggregates: Aggregates,
    pub status: IndexerStatus,
}

// =============================================================================
// QueryService
// =============================================================================

/// Cheap-to-clone read handle; any number may run concurrently.
#[derive(Debug, Clone)]
pub struct QueryService {
    state: SharedState,
}

impl QueryService {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub fn vault_state(&self) -> VaultState {
        self.state.read().accountant.state()
    }

    pub fn vault(&self) -> VaultView {
        let state = self.state.read();
        vault_view(&state.accountant.state(), state.accountant.policy())
    }

    /// Grant with projections at `at`, defaulting to the last indexed
    /// block timestamp.
    pub fn grant(&self, grant_id: &GrantId, at: Option<u64>) -> Option<GrantView> {
        let state = self.state.read();
        let at = at.unwrap_or_else(|| state.aggregates.last_block_timestamp.unwrap_or(0));
        state.ledger.get_grant(grant_id).map(|g| GrantView::project(g, at))
    }

    pub fn aggregates(&self) -> Aggregates {
        self.state.read().aggregates.clone()
    }

    pub fn account(&self, owner: &Address) -> Option<AccountPosition> {
        self.state.read().ledger.account(owner).cloned()
    }

    /// Page through an owner's grants (cursor = grant id).
    pub fn grants_for_owner(&self, owner: &Address, pagination: &Pagination, at: Option<u64>) -> Connection<GrantView> {
        let state = self.state.read();
        let at = at.unwrap_or_else(|| state.aggregates.last_block_timestamp.unwrap_or(0));
        let views: Vec<GrantView> = state
            .ledger
            .grants_for_owner(owner)
            .map(|g| GrantView::project(g, at))
            .collect();
        Connection::paginate(views, pagination, |v| Cursor::new(v.grant.grant_id.to_string()))
    }

    pub fn status(&self) -> IndexerStatus {
        self.state.read().status.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            vault: vault_view(&state.accountant.state(), state.accountant.policy()),
            aggregates: state.aggregates.clone(),
            status: state.status.clone(),
        }
    }
}

fn vault_view(state: &VaultState, policy: &FeePolicy) -> VaultView {
    VaultView {
        state: *state,
        backing_ratio: state.backing_ratio(),
        policy: *policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{VestingSchedule, WAD};
    use crate::models::EventKey;
    use crate::services::state::IndexState;

    fn owner(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn seeded() -> QueryService {
        let mut state = IndexState::new(FeePolicy::default());
        for (token, who) in [(1u64, 1u8), (2, 1), (3, 2), (4, 1)] {
            let grant = Grant::new(
                GrantId::new(token, 1),
                owner(who),
                1000,
                VestingSchedule::new(0, 900).unwrap(),
                EventKey::new(token, 0),
            );
            state.ledger.record_deposit(grant).unwrap();
            state.accountant.mint(1000).unwrap();
        }
        state.aggregates.last_block_timestamp = Some(450);
        QueryService::new(SharedState::new(state))
    }

    #[test]
    fn grant_projection_defaults_to_last_block_time() {
        let query = seeded();
        let view = query.grant(&GrantId::new(1, 1), None).unwrap();
        assert_eq!(view.at, 450);
        assert_eq!(view.claimable_fraction, WAD / 2);
        assert_eq!(view.claimable_fraction + view.penalty_fraction, WAD);
        assert_eq!(view.projected_claimable, 500);

        let later = query.grant(&GrantId::new(1, 1), Some(900)).unwrap();
        assert_eq!(later.projected_claimable, 1000);
        assert!(query.grant(&GrantId::new(9, 9), None).is_none());
    }

    #[test]
    fn grants_for_owner_paginates_by_grant_id() {
        let query = seeded();
        let first = query.grants_for_owner(
            &owner(1),
            &Pagination {
                first: Some(2),
                after: None,
            },
            None,
        );
        assert_eq!(first.total_count, 3);
        assert!(first.page_info.has_next_page);

        let rest = query.grants_for_owner(
            &owner(1),
            &Pagination {
                first: Some(2),
                after: first.page_info.end_cursor.clone(),
            },
            None,
        );
        let ids: Vec<String> = rest.nodes().map(|v| v.grant.grant_id.to_string()).collect();
        assert_eq!(ids, vec!["4-1"]);
    }

    #[test]
    fn snapshot_is_consistent_and_serializable() {
        let query = seeded();
        let snap = query.snapshot();
        assert_eq!(snap.vault.state.total_assets, 4000);
        assert_eq!(snap.vault.state.total_supply, 3960);
        assert_eq!(snap.aggregates, query.aggregates());

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["vault"]["total_assets"], "4000");
        assert_eq!(json["status"]["state"], "running");
    }
}
