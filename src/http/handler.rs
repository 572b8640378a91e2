//! HTTP handlers for the SPARQL endpoint

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use crate::store::{SparqlClient, Store};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Request for executing a query or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlRequest {
    pub query: String,
    /// Replaces FROM clauses when non-empty
    #[serde(default, rename = "default-graph-uri", skip_serializing_if = "Vec::is_empty")]
    pub default_graph_uri: Vec<String>,
    /// Replaces FROM NAMED clauses when non-empty
    #[serde(default, rename = "named-graph-uri", skip_serializing_if = "Vec::is_empty")]
    pub named_graph_uri: Vec<String>,
}

impl SparqlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            default_graph_uri: Vec::new(),
            named_graph_uri: Vec::new(),
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler for SPARQL queries and updates
pub async fn sparql_handler(
    State(store): State<Store>,
    Json(payload): Json<SparqlRequest>,
) -> impl IntoResponse {
    let result = store
        .execute_with_graphs(&payload.query, &payload.default_graph_uri, &payload.named_graph_uri)
        .await;

    match result.map(|outcome| outcome.encode()) {
        Ok(Ok(encoded)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoded.content_type)],
            encoded.body,
        )
            .into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: e.to_string() }),
        )
            .into_response(),
        Err(e) => {
            warn!("Rejected request: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody { error: e.to_string() }),
            )
                .into_response()
        }
    }
}

/// Handler for health checks
pub async fn status_handler(State(store): State<Store>) -> impl IntoResponse {
    match store.status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: e.to_string() }),
        )
            .into_response(),
    }
}
