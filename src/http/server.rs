//! HTTP server exposing a store to other processes

use axum::{
    routing::{get, post},
    Router,
};
use crate::store::Store;
use tower_http::cors::CorsLayer;
use tracing::info;
use super::handler::{sparql_handler, status_handler};

/// SPARQL endpoint over one store
pub struct SparqlServer {
    store: Store,
    port: u16,
}

impl SparqlServer {
    /// Create a new server
    pub fn new(store: Store, port: u16) -> Self {
        Self { store, port }
    }

    /// Routes: `POST /sparql`, `GET /status`
    pub fn router(&self) -> Router {
        Router::new()
            .route("/sparql", post(sparql_handler))
            .route("/status", get(status_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.store.clone())
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("SPARQL endpoint available at http://localhost:{}/sparql", self.port);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
