//! Plain JSON routes mirroring the GraphQL query surface.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use vesta_core::models::{AccountPosition, Aggregates, IndexerStatus};
use vesta_core::services::{GrantView, QueryService, VaultView};

use crate::schema::{parse_address, parse_grant_id};

/// Error body for the JSON routes.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AtParams {
    at: Option<u64>,
}

pub(crate) async fn vault_state(State(query): State<QueryService>) -> Json<VaultView> {
    Json(query.vault())
}

pub(crate) async fn grant(
    State(query): State<QueryService>,
    Path(grant_id): Path<String>,
    Query(params): Query<AtParams>,
) -> Result<Json<GrantView>, ApiError> {
    let id = parse_grant_id(&grant_id).map_err(|e| ApiError::BadRequest(e.message))?;
    query
        .grant(&id, params.at)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("grant {id} not found")))
}

pub(crate) async fn aggregates(State(query): State<QueryService>) -> Json<Aggregates> {
    Json(query.aggregates())
}

pub(crate) async fn account(
    State(query): State<QueryService>,
    Path(owner): Path<String>,
) -> Result<Json<AccountPosition>, ApiError> {
    let owner = parse_address(&owner).map_err(|e| ApiError::BadRequest(e.message))?;
    query
        .account(&owner)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("account {owner} not found")))
}

pub(crate) async fn status(State(query): State<QueryService>) -> Json<IndexerStatus> {
    Json(query.status())
}
