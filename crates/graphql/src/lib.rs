//! Read-only query API for the vesta indexer.
//!
//! Serves the in-memory [`QueryService`](vesta_core::services::QueryService)
//! over HTTP as GraphQL (`/graphql`) and as plain JSON routes (`/api/...`).
//!
//! ```ignore
//! let schema = vesta_graphql::build_schema(query.clone());
//! vesta_graphql::serve_with_shutdown(schema, query, ServerConfig::default(), shutdown).await?;
//! ```

mod rest;
mod schema;
mod server;
mod types;

#[cfg(test)]
mod test_support;

pub use schema::{MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, VaultQuery, build_schema};
pub use server::{ServerConfig, router, serve_with_shutdown};
pub use types::VestaSchema;
