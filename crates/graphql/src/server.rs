//! HTTP server for the query API.

use std::future::Future;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::{FromRef, State},
    response::{Html, IntoResponse},
    routing::get,
};
use tracing::info;

use vesta_core::services::QueryService;

use crate::rest;
use crate::types::VestaSchema;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_playground: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_playground: true,
        }
    }
}

#[derive(Clone)]
struct AppState {
    schema: VestaSchema,
    query: QueryService,
}

impl FromRef<AppState> for VestaSchema {
    fn from_ref(state: &AppState) -> Self {
        state.schema.clone()
    }
}

impl FromRef<AppState> for QueryService {
    fn from_ref(state: &AppState) -> Self {
        state.query.clone()
    }
}

/// Build the router: `/graphql`, `/health` and the `/api` JSON routes.
pub fn router(schema: VestaSchema, query: QueryService, enable_playground: bool) -> Router {
    let mut app = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .route("/health", get(health_check))
        .route("/api/vault-state", get(rest::vault_state))
        .route("/api/grants/{grant_id}", get(rest::grant))
        .route("/api/aggregates", get(rest::aggregates))
        .route("/api/accounts/{owner}", get(rest::account))
        .route("/api/status", get(rest::status));

    if enable_playground {
        app = app.route("/", get(graphql_playground));
    }

    app.with_state(AppState { schema, query })
}

/// Start the server with graceful shutdown support.
pub async fn serve_with_shutdown<F>(
    schema: VestaSchema,
    query: QueryService,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(schema, query, config.enable_playground);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("⚡ Query API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

/// GraphQL query handler.
async fn graphql_handler(State(schema): State<VestaSchema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

/// GraphQL Playground UI.
async fn graphql_playground() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
