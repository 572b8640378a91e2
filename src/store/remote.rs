//! Client for a store running in another process
//!
//! Requests travel as JSON to the `/sparql` endpoint served by
//! [`SparqlServer`](crate::http::SparqlServer); results come back in the
//! media type named by the response `Content-Type`.

use super::connector::ServerProcess;
use super::{LoadSource, QueryDispatcher, SparqlClient, StoreError, StoreResult, StoreStatus};
use crate::config::StoreConfig;
use crate::engine::RdfLoader;
use crate::http::{ErrorBody, SparqlRequest};
use crate::rdf::{NamedNode, NamespaceManager, Triple};
use crate::sparql::{ExecutionOutcome, SparqlResults, UpdateSummary, SPARQL_RESULTS_JSON};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handle to an out-of-process store
pub struct RemoteStore {
    client: Client,
    endpoint: String,
    timeout: Duration,
    namespaces: NamespaceManager,
    loader: RdfLoader,
    base_uri: Option<String>,
    /// Set when this handle started the server; dropping it stops the server
    process: Option<ServerProcess>,
}

impl RemoteStore {
    pub fn new(client: Client, endpoint: impl Into<String>, config: &StoreConfig) -> Self {
        let mut namespaces = NamespaceManager::new();
        for (prefix, iri) in &config.default_prefixes {
            namespaces.add_prefix(prefix.as_str(), iri.as_str());
        }
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            namespaces,
            loader: RdfLoader::new(Arc::new(HttpTransport::new().with_timeout(config.request_timeout()))),
            base_uri: config.base_uri.clone(),
            process: None,
        }
    }

    pub(super) fn with_process(mut self, process: ServerProcess) -> Self {
        self.process = Some(process);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Process id of the server this handle started, if it started one
    pub fn server_pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ServerProcess::id)
    }

    /// Register a prefix used when building statements locally
    pub fn set_prefix(&mut self, prefix: &str, iri: &str) {
        self.namespaces.add_prefix(prefix, iri);
    }

    fn dispatcher(&self) -> QueryDispatcher<'_> {
        QueryDispatcher::new(&self.namespaces)
    }

    async fn send(&self, request: SparqlRequest) -> StoreResult<ExecutionOutcome> {
        debug!("POST {}/sparql: {}", self.endpoint, request.query);
        let response = self
            .client
            .post(format!("{}/sparql", self.endpoint))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let response = check(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(SPARQL_RESULTS_JSON)
            .to_string();
        let body = response.bytes().await?;
        Ok(ExecutionOutcome::decode(&content_type, &body)?)
    }

    async fn send_update(&self, statement: String) -> StoreResult<UpdateSummary> {
        self.execute(&statement)
            .await?
            .update()
            .ok_or_else(|| StoreError::UnexpectedResult("update returned query results".to_string()))
    }
}

/// Turn a non-success response into [`StoreError::Remote`]
async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(StoreError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl SparqlClient for RemoteStore {
    async fn execute(&self, query: &str) -> StoreResult<ExecutionOutcome> {
        self.send(SparqlRequest::new(query)).await
    }

    async fn execute_with_graphs(
        &self,
        query: &str,
        default_graphs: &[String],
        named_graphs: &[String],
    ) -> StoreResult<ExecutionOutcome> {
        let mut request = SparqlRequest::new(query);
        request.default_graph_uri = default_graphs.to_vec();
        request.named_graph_uri = named_graphs.to_vec();
        self.send(request).await
    }

    async fn insert(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.dispatcher().insert_statement(triples, graph);
        self.send_update(statement).await
    }

    async fn delete(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.dispatcher().delete_statement(triples, graph);
        self.send_update(statement).await
    }

    async fn clear(&self, graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.dispatcher().clear_statement(graph);
        self.send_update(statement).await
    }

    /// Remote documents are fetched by the server; local data is parsed
    /// here and shipped as `INSERT DATA`.
    async fn load(&self, source: LoadSource, graph: Option<&NamedNode>) -> StoreResult<usize> {
        let target = graph.map(|g| self.dispatcher().serializer().resolve(g));
        let quads = match source {
            LoadSource::Remote { uri } => {
                let uri = self.namespaces.resolve_against(&uri, self.base_uri.as_deref())?;
                let statement = self.dispatcher().load_statement(&uri, graph);
                return Ok(self.send_update(statement).await?.inserted);
            }
            LoadSource::File { media_type, path } => {
                self.loader
                    .load_from_file(&media_type, &path, target.as_deref())
                    .await?
            }
            LoadSource::Inline { media_type, data } => self.loader.try_to_parse(
                &media_type,
                &data,
                target.as_deref(),
                self.base_uri.as_deref(),
            )?,
        };

        let mut by_graph: BTreeMap<Option<String>, Vec<Triple>> = BTreeMap::new();
        for quad in &quads {
            by_graph.entry(quad.graph.clone()).or_default().push(quad.to_triple()?);
        }

        let mut inserted = 0;
        for (graph, triples) in by_graph {
            let graph = graph.map(NamedNode::new_unchecked);
            inserted += self.insert(&triples, graph.as_ref()).await?.inserted;
        }
        Ok(inserted)
    }

    async fn graph(&self, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>> {
        let statement = self.dispatcher().graph_statement(graph);
        match self.execute(&statement).await? {
            ExecutionOutcome::Results(SparqlResults::Graph(triples)) => Ok(triples),
            other => Err(StoreError::UnexpectedResult(format!(
                "expected a graph, got {:?}",
                other
            ))),
        }
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        let response = self
            .client
            .get(format!("{}/status", self.endpoint))
            .timeout(self.timeout)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}
