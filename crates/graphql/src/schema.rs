//! GraphQL schema definition.
//!
//! Every resolver reads from the in-memory [`QueryService`]; nothing here
//! touches storage or blocks the indexer.

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Result, Schema};

use vesta_core::models::{Address, GrantId};
use vesta_core::ports::{Cursor, Pagination};
use vesta_core::services::QueryService;

use crate::types::{Account, Aggregates, Grant, GrantConnection, IndexerStatus, VaultState, VestaSchema};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Build the schema over a query handle.
///
/// Includes query depth and complexity limits for DoS protection.
pub fn build_schema(query: QueryService) -> VestaSchema {
    Schema::build(VaultQuery, EmptyMutation, EmptySubscription)
        .data(query)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Query root
// -----------------------------------------------------------------------------

/// Query root: vault totals, grants, accounts, aggregates and status.
#[derive(Default)]
pub struct VaultQuery;

#[Object]
impl VaultQuery {
    /// Current vault totals, backing ratio and fee policy.
    async fn vault_state<'ctx>(&self, ctx: &Context<'ctx>) -> Result<VaultState> {
        let query = ctx.data::<QueryService>()?;
        Ok(query.vault().into())
    }

    /// A grant by id (`"<tokenId>-<season>"`), with projections at `at`
    /// (default: last indexed block timestamp).
    async fn grant<'ctx>(&self, ctx: &Context<'ctx>, grant_id: String, at: Option<u64>) -> Result<Option<Grant>> {
        let query = ctx.data::<QueryService>()?;
        let id = parse_grant_id(&grant_id)?;
        Ok(query.grant(&id, at).map(Grant::from))
    }

    /// Grants of one owner, ordered by grant id.
    async fn grants<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        owner: String,
        #[graphql(default = 20)] first: Option<i32>,
        after: Option<String>,
        at: Option<u64>,
    ) -> Result<GrantConnection> {
        let query = ctx.data::<QueryService>()?;
        let owner = parse_address(&owner)?;
        if let Some(after) = &after {
            parse_grant_id(after)?;
        }

        let pagination = Pagination {
            first: Some(validate_pagination_first(first)),
            after: after.map(Cursor::new),
        };

        Ok(query.grants_for_owner(&owner, &pagination, at).into())
    }

    /// Activity of one account.
    async fn account<'ctx>(&self, ctx: &Context<'ctx>, owner: String) -> Result<Option<Account>> {
        let query = ctx.data::<QueryService>()?;
        let owner = parse_address(&owner)?;
        Ok(query.account(&owner).map(Account::from))
    }

    /// Running totals over the processed event stream.
    async fn aggregates<'ctx>(&self, ctx: &Context<'ctx>) -> Result<Aggregates> {
        let query = ctx.data::<QueryService>()?;
        Ok(query.aggregates().into())
    }

    /// Whether indexing is running or halted.
    async fn status<'ctx>(&self, ctx: &Context<'ctx>) -> Result<IndexerStatus> {
        let query = ctx.data::<QueryService>()?;
        Ok(query.status().into())
    }
}

// -----------------------------------------------------------------------------
// Helpers & Validation
// -----------------------------------------------------------------------------

/// Maximum length for address strings (40 hex chars + "0x" prefix).
const MAX_ADDRESS_LENGTH: usize = 42;
/// Maximum length for grant ids (two u64 decimals and a dash).
const MAX_GRANT_ID_LENGTH: usize = 41;
/// Maximum page size for pagination.
const MAX_PAGE_SIZE: i32 = 100;
/// Default page size for pagination.
const DEFAULT_PAGE_SIZE: i32 = 20;

/// Parse and validate an owner address.
pub(crate) fn parse_address(s: &str) -> Result<Address> {
    if s.len() > MAX_ADDRESS_LENGTH {
        return Err(async_graphql::Error::new(format!(
            "Address too long: maximum {} characters allowed",
            MAX_ADDRESS_LENGTH
        )));
    }

    let hex = s.strip_prefix("0x").unwrap_or(s);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(async_graphql::Error::new(
            "Invalid address: must contain only hexadecimal characters",
        ));
    }

    Address::from_hex(s)
        .map_err(|_| async_graphql::Error::new("Address must be exactly 20 bytes (40 hex characters)"))
}

/// Parse and validate a grant id.
pub(crate) fn parse_grant_id(s: &str) -> Result<GrantId> {
    if s.is_empty() || s.len() > MAX_GRANT_ID_LENGTH {
        return Err(async_graphql::Error::new(format!(
            "Grant id must be 1 to {} characters",
            MAX_GRANT_ID_LENGTH
        )));
    }
    s.parse::<GrantId>().map_err(async_graphql::Error::new)
}

/// Validate and normalize pagination first parameter.
fn validate_pagination_first(first: Option<i32>) -> usize {
    first.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize
}
