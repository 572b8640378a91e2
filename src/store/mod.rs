//! Public quad-store facade
//!
//! [`Store`] exposes SPARQL execution, CRUD helpers, bulk loading and live
//! subscriptions over one [`SparqlEngine`]. Every helper is turned into
//! SPARQL text by the [`QueryDispatcher`] and funnelled through the same
//! execute path as user queries.
//!
//! # Example
//!
//! ```rust,no_run
//! use quadstore::config::StoreConfig;
//! use quadstore::store::create;
//!
//! # async fn example() -> quadstore::store::StoreResult<()> {
//! let store = create(StoreConfig::default()).await?;
//! store.set_prefix("ex", "http://example.org/");
//! store
//!     .execute("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }")
//!     .await?;
//! let outcome = store.execute("SELECT * WHERE { ?s ?p ?o }").await?;
//! assert_eq!(outcome.results().map(|r| r.len()), Some(1));
//! # Ok(())
//! # }
//! ```

mod client;
mod connector;
mod dispatcher;
mod remote;
mod serializer;
mod subscriptions;

pub use client::{SparqlClient, StoreStatus};
pub use connector::{
    connect, connect_with, create, Connection, HttpConnector, OutOfProcessConnector, ProcessConnector,
    SERVER_PROGRAM,
};
pub use dispatcher::QueryDispatcher;
pub use remote::RemoteStore;
pub use serializer::TermSerializer;
pub use subscriptions::{Subscription, SubscriptionHandle, SubscriptionKind, SubscriptionRegistry};

use crate::config::{ConfigError, StoreConfig};
use crate::engine::{
    BackendError, ChangeEvent, Delivery, GraphScope, GraphSelector, LoadError, QuadPattern, SparqlEngine,
    TermDescriptor, DEFAULT_GRAPH_URI,
};
use crate::rdf::{
    NamedNode, NamespaceManager, PrefixError, RdfError, RdfFormat, RdfParser, RdfSerializer,
    RdfTerm, SerializeError, TermFactory, Triple, TriplePattern,
};
use crate::sparql::{
    ExecutionOutcome, FetchedLoads, ParsedRequest, SparqlError, SparqlResults, UpdateSummary,
};
use crate::transport::{Transport, TransportError};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Query parsing or evaluation failed
    #[error("SPARQL error: {0}")]
    Sparql(#[from] SparqlError),

    /// Storage failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Loading a document failed
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Invalid term
    #[error("RDF error: {0}")]
    Rdf(#[from] RdfError),

    /// Unresolvable IRI
    #[error("Prefix error: {0}")]
    Prefix(#[from] PrefixError),

    /// Export failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    /// Network transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP client error talking to a remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON from a remote store
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking initialization task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Starting a server process failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned server exited before answering
    #[error("Server exited during startup: {0}")]
    ServerExited(String),

    /// A remote store rejected the request
    #[error("Remote store returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// Bad argument at a public entry point
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine answered with an unexpected result kind
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Where `load` reads RDF from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// A document fetched through the transport with `LOAD`
    Remote { uri: String },
    /// A local file parsed with the parser registered for `media_type`
    File { media_type: String, path: PathBuf },
    /// Text parsed with the parser registered for `media_type`
    Inline { media_type: String, data: String },
}

impl LoadSource {
    pub fn remote(uri: impl Into<String>) -> Self {
        LoadSource::Remote { uri: uri.into() }
    }

    pub fn file(media_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        LoadSource::File {
            media_type: media_type.into(),
            path: path.into(),
        }
    }

    pub fn inline(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        LoadSource::Inline {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// Prefixes used for term resolution plus those implicitly declared in queries
#[derive(Debug, Clone, Default)]
struct Namespaces {
    manager: NamespaceManager,
    query_prefixes: IndexMap<String, String>,
}

impl Namespaces {
    fn register_default(&mut self, prefix: &str, iri: &str) {
        self.manager.add_prefix(prefix, iri);
        self.query_prefixes.insert(prefix.to_string(), iri.to_string());
    }

    /// `PREFIX` declarations for every default namespace
    fn prologue(&self) -> String {
        self.query_prefixes
            .iter()
            .map(|(prefix, iri)| format!("PREFIX {}: <{}>\n", prefix, iri))
            .collect()
    }
}

/// Graph name as stored by the engine; the default-graph IRI maps to `None`
fn stored_graph(iri: String) -> Option<String> {
    (iri != DEFAULT_GRAPH_URI).then_some(iri)
}

fn deliver(deliveries: Vec<Delivery>) {
    if !deliveries.is_empty() {
        debug!("Delivering {} notifications", deliveries.len());
    }
    for delivery in deliveries {
        delivery.deliver();
    }
}

/// Assembles a [`Store`] with injected collaborators
pub struct StoreBuilder {
    config: StoreConfig,
    transport: Option<Arc<dyn Transport>>,
    connector: Option<Arc<dyn OutOfProcessConnector>>,
    parsers: Vec<(String, Arc<dyn RdfParser>)>,
}

impl StoreBuilder {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            transport: None,
            connector: None,
            parsers: Vec::new(),
        }
    }

    /// Transport used for remote loads (default: [`HttpTransport`](crate::transport::HttpTransport))
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connector tried first by [`StoreBuilder::connect`]
    pub fn connector(mut self, connector: Arc<dyn OutOfProcessConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register an extra parser
    pub fn parser(mut self, media_type: impl Into<String>, parser: Arc<dyn RdfParser>) -> Self {
        self.parsers.push((media_type.into(), parser));
        self
    }

    /// Build an in-process store
    pub async fn build(self) -> StoreResult<Store> {
        connector::build_store(self.config, self.transport, self.parsers).await
    }

    /// Reach an out-of-process store, falling back to an in-process one
    pub async fn connect(self, endpoint: Option<&str>) -> StoreResult<Connection> {
        connector::connect_builder(self, endpoint).await
    }
}

/// In-process quad store
#[derive(Clone)]
pub struct Store {
    engine: Arc<RwLock<SparqlEngine>>,
    namespaces: Arc<StdRwLock<Namespaces>>,
    subscriptions: Arc<SubscriptionRegistry>,
    config: Arc<StoreConfig>,
}

impl Store {
    pub fn builder(config: StoreConfig) -> StoreBuilder {
        StoreBuilder::new(config)
    }

    pub(crate) fn from_engine(engine: SparqlEngine, config: StoreConfig) -> Self {
        let mut namespaces = Namespaces::default();
        let mut prefixes: Vec<(&String, &String)> = config.default_prefixes.iter().collect();
        prefixes.sort();
        for (prefix, iri) in prefixes {
            namespaces.register_default(prefix, iri);
        }
        Self {
            engine: Arc::new(RwLock::new(engine)),
            namespaces: Arc::new(StdRwLock::new(namespaces)),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn with_namespaces<T>(&self, f: impl FnOnce(&Namespaces) -> T) -> T {
        let guard = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn with_namespaces_mut<T>(&self, f: impl FnOnce(&mut Namespaces) -> T) -> T {
        let mut guard = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn with_dispatcher<T>(&self, f: impl FnOnce(&QueryDispatcher<'_>) -> T) -> T {
        self.with_namespaces(|ns| f(&QueryDispatcher::new(&ns.manager)))
    }

    /// Run a query or update
    pub async fn execute(&self, query: &str) -> StoreResult<ExecutionOutcome> {
        self.dispatch(query, None).await
    }

    /// Run a query or update against explicit default and named graphs
    ///
    /// The graphs replace any FROM / FROM NAMED clauses of the query.
    pub async fn execute_with_graphs(
        &self,
        query: &str,
        default_graphs: &[String],
        named_graphs: &[String],
    ) -> StoreResult<ExecutionOutcome> {
        let scope = self.with_dispatcher(|d| d.scope(default_graphs, named_graphs));
        self.dispatch(query, Some(scope)).await
    }

    /// The single path every operation goes through
    async fn dispatch(&self, query: &str, scope: Option<GraphScope>) -> StoreResult<ExecutionOutcome> {
        let text = format!("{}{}", self.with_namespaces(Namespaces::prologue), query);
        debug!("Executing: {}", query);
        let request = ParsedRequest::parse(&text, self.config.base_uri.as_deref())?;

        match request {
            ParsedRequest::Query(query) => {
                let engine = self.engine.read().await;
                Ok(ExecutionOutcome::Results(engine.query(&query, scope.as_ref())?))
            }
            ParsedRequest::Update(update) => {
                // Remote documents are fetched before the write lock is taken
                let loads = if FetchedLoads::needed(&update) {
                    let loader = self.engine.read().await.loader().clone();
                    FetchedLoads::fetch(&loader, &update).await
                } else {
                    FetchedLoads::default()
                };

                let (result, deliveries) = {
                    let mut engine = self.engine.write().await;
                    engine.update(&update, scope.as_ref(), loads)
                };
                // Operations applied before a failure still notify
                deliver(deliveries);
                Ok(ExecutionOutcome::Update(result?))
            }
        }
    }

    async fn dispatch_update(&self, statement: String) -> StoreResult<UpdateSummary> {
        match self.dispatch(&statement, None).await? {
            ExecutionOutcome::Update(summary) => Ok(summary),
            ExecutionOutcome::Results(_) => Err(StoreError::UnexpectedResult(
                "update returned query results".to_string(),
            )),
        }
    }

    async fn dispatch_construct(&self, statement: String) -> StoreResult<Vec<Triple>> {
        match self.dispatch(&statement, None).await? {
            ExecutionOutcome::Results(SparqlResults::Graph(triples)) => Ok(triples),
            other => Err(StoreError::UnexpectedResult(format!(
                "expected a graph, got {:?}",
                other
            ))),
        }
    }

    /// Insert triples into a graph (default graph when `None`)
    pub async fn insert(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.with_dispatcher(|d| d.insert_statement(triples, graph));
        self.dispatch_update(statement).await
    }

    /// Delete triples from a graph (default graph when `None`)
    pub async fn delete(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.with_dispatcher(|d| d.delete_statement(triples, graph));
        self.dispatch_update(statement).await
    }

    /// Remove every triple of a graph (default graph when `None`)
    pub async fn clear(&self, graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        let statement = self.with_dispatcher(|d| d.clear_statement(graph));
        self.dispatch_update(statement).await
    }

    /// Load RDF into a graph, returning the number of new quads
    ///
    /// Notifications are only delivered when batch-load events are enabled.
    pub async fn load(&self, source: LoadSource, graph: Option<&NamedNode>) -> StoreResult<usize> {
        let target = graph.map(|g| self.with_dispatcher(|d| d.serializer().resolve(g)));

        let quads = match source {
            LoadSource::Remote { uri } => {
                let uri = self.with_namespaces(|ns| {
                    ns.manager.resolve_against(&uri, self.config.base_uri.as_deref())
                })?;
                let statement = self.with_dispatcher(|d| d.load_statement(&uri, graph));
                return Ok(self.dispatch_update(statement).await?.inserted);
            }
            LoadSource::File { media_type, path } => {
                let loader = self.engine.read().await.loader().clone();
                loader.load_from_file(&media_type, &path, target.as_deref()).await?
            }
            LoadSource::Inline { media_type, data } => {
                let engine = self.engine.read().await;
                engine.loader().try_to_parse(
                    &media_type,
                    &data,
                    target.as_deref(),
                    self.config.base_uri.as_deref(),
                )?
            }
        };

        let (inserted, deliveries) = {
            let mut engine = self.engine.write().await;
            engine.batch_load(quads, None)?
        };
        deliver(deliveries);
        Ok(inserted)
    }

    /// Every triple of a graph (default graph when `None`)
    pub async fn graph(&self, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>> {
        let statement = self.with_dispatcher(|d| d.graph_statement(graph));
        self.dispatch_construct(statement).await
    }

    /// Every triple with `subject` in a graph
    pub async fn node(&self, subject: &NamedNode, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>> {
        let statement = self.with_dispatcher(|d| d.node_statement(subject, graph));
        self.dispatch_construct(statement).await
    }

    /// Named graphs holding at least one triple
    pub async fn registered_graphs(&self) -> StoreResult<Vec<NamedNode>> {
        let graphs = self.engine.read().await.named_graphs()?;
        Ok(graphs.into_iter().map(NamedNode::new_unchecked).collect())
    }

    /// Serialize a graph
    pub async fn export(&self, graph: Option<&NamedNode>, format: RdfFormat) -> StoreResult<String> {
        let triples = self.graph(graph).await?;
        Ok(RdfSerializer::serialize(&triples, format)?)
    }

    /// Receive the full description of `subject` after every change to it
    ///
    /// Without a graph the default graph is observed.
    pub async fn start_observing_node<F>(
        &self,
        subject: &NamedNode,
        graph: Option<&NamedNode>,
        callback: F,
    ) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<Triple>) + Send + Sync + 'static,
    {
        let (subject, graph) = self.with_dispatcher(|d| {
            let serializer = d.serializer();
            (
                serializer.resolve(subject),
                graph.and_then(|g| stored_graph(serializer.resolve(g))),
            )
        });

        let observer = self.engine.write().await.callbacks_mut().observe_node(
            TermDescriptor::uri(subject.as_str()),
            graph,
            subscriptions::node_adapter(callback),
        );
        Ok(self.subscriptions.register(SubscriptionKind::Node, subject, observer))
    }

    pub async fn stop_observing_node(&self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions.remove(handle, SubscriptionKind::Node) {
            Some(observer) => self.engine.write().await.callbacks_mut().stop_observing_node(observer),
            None => false,
        }
    }

    /// Receive new results whenever a change alters what `query` returns
    ///
    /// The returned future resolves once the observer is active.
    pub async fn start_observing_query<F>(&self, query: &str, callback: F) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(&SparqlResults) + Send + Sync + 'static,
    {
        let text = format!("{}{}", self.with_namespaces(Namespaces::prologue), query);
        let parsed = match ParsedRequest::parse(&text, self.config.base_uri.as_deref())? {
            ParsedRequest::Query(parsed) => parsed,
            ParsedRequest::Update(_) => {
                return Err(StoreError::InvalidArgument(
                    "only queries can be observed, not updates".to_string(),
                ))
            }
        };

        let observer = {
            let mut engine = self.engine.write().await;
            let initial = engine.query(&parsed, None)?;
            engine
                .callbacks_mut()
                .observe_query(parsed, initial, subscriptions::query_adapter(callback))
        };
        Ok(self.subscriptions.register(SubscriptionKind::Query, query, observer))
    }

    pub async fn stop_observing_query(&self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions.remove(handle, SubscriptionKind::Query) {
            Some(observer) => self.engine.write().await.callbacks_mut().stop_observing_query(observer),
            None => false,
        }
    }

    /// Receive added and deleted triples matching `pattern` in `graph`
    pub async fn subscribe<F>(
        &self,
        pattern: &TriplePattern,
        graph: &NamedNode,
        callback: F,
    ) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(ChangeEvent, Vec<Triple>) + Send + Sync + 'static,
    {
        if graph.as_str().is_empty() {
            return Err(StoreError::InvalidArgument(
                "a pattern subscription needs a graph".to_string(),
            ));
        }

        let quad_pattern = self.with_dispatcher(|d| {
            let serializer = d.serializer();
            let descriptor = |term: Option<RdfTerm>| term.map(|t| serializer.descriptor(&t));
            QuadPattern {
                subject: descriptor(pattern.subject.clone().map(RdfTerm::from)),
                predicate: descriptor(pattern.predicate.clone().map(RdfTerm::from)),
                object: descriptor(pattern.object.clone().map(RdfTerm::from)),
                graph: match stored_graph(serializer.resolve(graph)) {
                    Some(g) => GraphSelector::Named(g),
                    None => GraphSelector::Default,
                },
            }
        });

        let target = describe_pattern(&quad_pattern);
        let observer = self
            .engine
            .write()
            .await
            .callbacks_mut()
            .subscribe(quad_pattern, subscriptions::pattern_adapter(callback));
        Ok(self.subscriptions.register(SubscriptionKind::Pattern, target, observer))
    }

    /// Cancel a pattern subscription; unknown handles are ignored
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        match self.subscriptions.remove(handle, SubscriptionKind::Pattern) {
            Some(observer) => self.engine.write().await.callbacks_mut().unsubscribe(observer),
            None => false,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Whether `load` delivers notifications
    pub async fn set_batch_load_events(&self, enabled: bool) {
        self.engine.write().await.set_batch_load_events(enabled);
    }

    /// Register a prefix for term resolution
    pub fn set_prefix(&self, prefix: &str, iri: &str) {
        self.with_namespaces_mut(|ns| ns.manager.add_prefix(prefix, iri));
    }

    /// Namespace for names without a prefix
    pub fn set_default_prefix(&self, iri: &str) {
        self.with_namespaces_mut(|ns| ns.manager.set_default_prefix(iri));
    }

    /// Register a prefix that is also implicitly declared in every query
    pub fn register_default_namespace(&self, prefix: &str, iri: &str) {
        self.with_namespaces_mut(|ns| ns.register_default(prefix, iri));
    }

    /// Register the common profile prefixes as default namespaces
    pub fn register_default_profile_namespaces(&self) {
        self.with_namespaces_mut(|ns| {
            for namespace in ns.manager.register_profile_namespaces() {
                ns.query_prefixes.insert(namespace.prefix, namespace.iri);
            }
        });
    }

    /// Term factory bound to the current prefixes
    pub fn rdf(&self) -> TermFactory {
        self.with_namespaces(|ns| TermFactory::new(ns.manager.clone()))
    }

    pub async fn register_parser(&self, media_type: &str, parser: Arc<dyn RdfParser>) {
        self.engine.write().await.loader_mut().register_parser(media_type, parser);
    }

    /// Replace the transport used by remote loads
    pub async fn set_transport(&self, transport: Arc<dyn Transport>) {
        self.engine.write().await.loader_mut().set_transport(transport);
    }

    /// Number of stored quads
    pub async fn len(&self) -> StoreResult<usize> {
        Ok(self.engine.read().await.len()?)
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Name of the backend variant in use
    pub async fn backend_name(&self) -> &'static str {
        self.engine.read().await.backend().name()
    }

    /// Persist pending state
    pub async fn flush(&self) -> StoreResult<()> {
        Ok(self.engine.write().await.flush()?)
    }

    /// Flush and release the store
    pub async fn close(self) -> StoreResult<()> {
        self.flush().await?;
        info!("Store '{}' closed", self.config.name);
        Ok(())
    }
}

fn describe_pattern(pattern: &QuadPattern) -> String {
    let position = |term: &Option<TermDescriptor>, var: &str| {
        term.as_ref().map_or_else(|| var.to_string(), |t| t.to_string())
    };
    let graph = match &pattern.graph {
        GraphSelector::Named(g) => format!("<{}>", g),
        other => format!("{:?}", other),
    };
    format!(
        "{} {} {} {}",
        position(&pattern.subject, "?s"),
        position(&pattern.predicate, "?p"),
        position(&pattern.object, "?o"),
        graph
    )
}
