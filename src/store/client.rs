//! Operations shared by in-process and out-of-process stores

use super::{LoadSource, Store, StoreResult};
use crate::rdf::{NamedNode, Triple};
use crate::sparql::{ExecutionOutcome, UpdateSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Health report served on `/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub status: String,
    pub version: String,
    pub quads: usize,
    pub engine: String,
}

/// SPARQL operations available on every kind of store handle
#[async_trait]
pub trait SparqlClient: Send + Sync {
    async fn execute(&self, query: &str) -> StoreResult<ExecutionOutcome>;

    async fn execute_with_graphs(
        &self,
        query: &str,
        default_graphs: &[String],
        named_graphs: &[String],
    ) -> StoreResult<ExecutionOutcome>;

    async fn insert(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary>;

    async fn delete(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary>;

    async fn clear(&self, graph: Option<&NamedNode>) -> StoreResult<UpdateSummary>;

    async fn load(&self, source: LoadSource, graph: Option<&NamedNode>) -> StoreResult<usize>;

    async fn graph(&self, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>>;

    async fn status(&self) -> StoreResult<StoreStatus>;
}

#[async_trait]
impl SparqlClient for Store {
    async fn execute(&self, query: &str) -> StoreResult<ExecutionOutcome> {
        Store::execute(self, query).await
    }

    async fn execute_with_graphs(
        &self,
        query: &str,
        default_graphs: &[String],
        named_graphs: &[String],
    ) -> StoreResult<ExecutionOutcome> {
        Store::execute_with_graphs(self, query, default_graphs, named_graphs).await
    }

    async fn insert(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        Store::insert(self, triples, graph).await
    }

    async fn delete(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        Store::delete(self, triples, graph).await
    }

    async fn clear(&self, graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        Store::clear(self, graph).await
    }

    async fn load(&self, source: LoadSource, graph: Option<&NamedNode>) -> StoreResult<usize> {
        Store::load(self, source, graph).await
    }

    async fn graph(&self, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>> {
        Store::graph(self, graph).await
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        Ok(StoreStatus {
            status: "ok".to_string(),
            version: crate::VERSION.to_string(),
            quads: self.len().await?,
            engine: self.backend_name().await.to_string(),
        })
    }
}
