//! GraphQL type definitions.
//!
//! Amounts are rendered as decimal strings (they exceed GraphQL `Int`);
//! WAD-scaled fractions and ratios as decimals such as `"0.5"`.

use async_graphql::{EmptyMutation, EmptySubscription, Schema, SimpleObject};

use vesta_core::domain::{FeePolicy, format_wad};
use vesta_core::models::{AccountPosition, Aggregates as CoreAggregates, IndexerStatus as CoreStatus};
use vesta_core::ports::Connection;
use vesta_core::services::{GrantView, VaultView};

use crate::schema::VaultQuery;

/// The GraphQL schema type.
pub type VestaSchema = Schema<VaultQuery, EmptyMutation, EmptySubscription>;

// -----------------------------------------------------------------------------
// Vault
// -----------------------------------------------------------------------------

#[derive(SimpleObject)]
pub struct Policy {
    pub mint_fee_bps: u32,
    pub redeem_fee_bps: u32,
    pub backing_ratio_floor: String,
}

impl From<FeePolicy> for Policy {
    fn from(p: FeePolicy) -> Self {
        Self {
            mint_fee_bps: p.mint_fee_bps,
            redeem_fee_bps: p.redeem_fee_bps,
            backing_ratio_floor: format_wad(p.backing_ratio_floor),
        }
    }
}

/// Vault-level totals.
#[derive(SimpleObject)]
pub struct VaultState {
    pub total_assets: String,
    pub total_supply: String,
    pub backing_ratio: String,
    pub matured: bool,
    pub policy: Policy,
}

impl From<VaultView> for VaultState {
    fn from(v: VaultView) -> Self {
        Self {
            total_assets: v.state.total_assets.to_string(),
            total_supply: v.state.total_supply.to_string(),
            backing_ratio: format_wad(v.backing_ratio),
            matured: v.state.matured,
            policy: v.policy.into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Grants
// -----------------------------------------------------------------------------

/// A grant with vesting projections at `at`.
#[derive(SimpleObject)]
pub struct Grant {
    pub grant_id: String,
    pub token_id: u64,
    pub season: u32,
    pub owner: String,
    pub total_value: String,
    pub claimed_value: String,
    pub start_time: u64,
    pub maturation_time: u64,
    pub minted: String,
    pub mint_fee: String,
    pub closed: bool,
    pub at: u64,
    pub claimable_fraction: String,
    pub penalty_fraction: String,
    pub vested: String,
    pub projected_claimable: String,
}

impl From<GrantView> for Grant {
    fn from(v: GrantView) -> Self {
        let g = v.grant;
        Self {
            grant_id: g.grant_id.to_string(),
            token_id: g.grant_id.token_id,
            season: g.grant_id.season,
            owner: g.owner.to_hex(),
            total_value: g.total_value.to_string(),
            claimed_value: g.claimed_value.to_string(),
            start_time: g.schedule.start_time(),
            maturation_time: g.schedule.maturation_time(),
            minted: g.minted.to_string(),
            mint_fee: g.mint_fee.to_string(),
            closed: g.closed,
            at: v.at,
            claimable_fraction: format_wad(v.claimable_fraction),
            penalty_fraction: format_wad(v.penalty_fraction),
            vested: v.vested.to_string(),
            projected_claimable: v.projected_claimable.to_string(),
        }
    }
}

#[derive(SimpleObject)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(SimpleObject)]
pub struct GrantEdge {
    pub node: Grant,
    pub cursor: String,
}

/// Relay-style page of grants.
#[derive(SimpleObject)]
pub struct GrantConnection {
    pub edges: Vec<GrantEdge>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

impl From<Connection<GrantView>> for GrantConnection {
    fn from(conn: Connection<GrantView>) -> Self {
        Self {
            edges: conn
                .edges
                .into_iter()
                .map(|e| GrantEdge {
                    node: Grant::from(e.node),
                    cursor: e.cursor.value,
                })
                .collect(),
            page_info: PageInfo {
                has_next_page: conn.page_info.has_next_page,
                has_previous_page: conn.page_info.has_previous_page,
                start_cursor: conn.page_info.start_cursor.map(|c| c.value),
                end_cursor: conn.page_info.end_cursor.map(|c| c.value),
            },
            total_count: conn.total_count as u64,
        }
    }
}

// -----------------------------------------------------------------------------
// Accounts, aggregates, status
// -----------------------------------------------------------------------------

#[derive(SimpleObject)]
pub struct Account {
    pub owner: String,
    pub grants: u64,
    pub deposited: String,
    pub minted: String,
    pub claimed: String,
    pub redeemed: String,
    pub assets_received: String,
    pub redeem_fees_paid: String,
}

impl From<AccountPosition> for Account {
    fn from(a: AccountPosition) -> Self {
        Self {
            owner: a.owner.to_hex(),
            grants: a.grants,
            deposited: a.deposited.to_string(),
            minted: a.minted.to_string(),
            claimed: a.claimed.to_string(),
            redeemed: a.redeemed.to_string(),
            assets_received: a.assets_received.to_string(),
            redeem_fees_paid: a.redeem_fees_paid.to_string(),
        }
    }
}

#[derive(SimpleObject)]
pub struct DiscardCount {
    pub reason: String,
    pub count: u64,
}

#[derive(SimpleObject)]
pub struct Aggregates {
    pub minted_supply: String,
    pub redeemed_supply: String,
    pub outstanding_supply: String,
    pub mint_fees: String,
    pub redeem_fees: String,
    pub assets_deposited: String,
    pub assets_paid_out: String,
    pub claimed_value: String,
    pub open_grants: u64,
    pub closed_grants: u64,
    pub applied_events: u64,
    pub discarded_events: u64,
    pub discarded_by_reason: Vec<DiscardCount>,
    pub last_processed: Option<String>,
    pub last_block_timestamp: Option<u64>,
}

impl From<CoreAggregates> for Aggregates {
    fn from(a: CoreAggregates) -> Self {
        Self {
            outstanding_supply: a.outstanding_supply().to_string(),
            minted_supply: a.minted_supply.to_string(),
            redeemed_supply: a.redeemed_supply.to_string(),
            mint_fees: a.mint_fees.to_string(),
            redeem_fees: a.redeem_fees.to_string(),
            assets_deposited: a.assets_deposited.to_string(),
            assets_paid_out: a.assets_paid_out.to_string(),
            claimed_value: a.claimed_value.to_string(),
            open_grants: a.open_grants,
            closed_grants: a.closed_grants,
            applied_events: a.applied_events,
            discarded_events: a.discarded_events,
            discarded_by_reason: a
                .discarded_by_reason
                .into_iter()
                .map(|(reason, count)| DiscardCount { reason, count })
                .collect(),
            last_processed: a.last_processed.map(|k| k.to_string()),
            last_block_timestamp: a.last_block_timestamp,
        }
    }
}

/// Indexer status.
#[derive(SimpleObject)]
pub struct IndexerStatus {
    pub halted: bool,
    pub reason: Option<String>,
    pub halted_at: Option<String>,
}

impl From<CoreStatus> for IndexerStatus {
    fn from(s: CoreStatus) -> Self {
        match s {
            CoreStatus::Running => Self {
                halted: false,
                reason: None,
                halted_at: None,
            },
            CoreStatus::Halted { reason, at } => Self {
                halted: true,
                reason: Some(reason),
                halted_at: at.map(|k| k.to_string()),
            },
        }
    }
}
