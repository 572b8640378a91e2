//! Store construction
//!
//! [`create`] builds an in-process store. [`connect`] first tries to start
//! (or reach) a store running in another process and falls back to an
//! in-process one when that fails.

use super::{
    LoadSource, RemoteStore, SparqlClient, Store, StoreBuilder, StoreError, StoreResult, StoreStatus,
};
use crate::config::{EngineKind, StoreConfig};
use crate::engine::{DocumentStore, EmbeddedBackend, Lexicon, QuadBackend, QuadIndex, RdfLoader, SparqlEngine};
use crate::rdf::{NamedNode, RdfParser, Triple};
use crate::sparql::{ExecutionOutcome, UpdateSummary};
use crate::transport::{HttpTransport, Transport};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Program started when no server binary is configured
pub const SERVER_PROGRAM: &str = "quadstore";

const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Starts or reaches a store outside this process
#[async_trait]
pub trait OutOfProcessConnector: Send + Sync {
    async fn connect(&self, endpoint: &str, config: &StoreConfig) -> StoreResult<RemoteStore>;
}

/// Connects to a [`SparqlServer`](crate::http::SparqlServer) over HTTP
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutOfProcessConnector for HttpConnector {
    /// Probe `/status` so a dead endpoint fails here rather than on first use
    async fn connect(&self, endpoint: &str, config: &StoreConfig) -> StoreResult<RemoteStore> {
        let store = RemoteStore::new(self.client.clone(), endpoint, config);
        let status = tokio::time::timeout(Duration::from_secs(5), store.status())
            .await
            .map_err(|_| StoreError::Remote {
                status: 0,
                message: format!("{} did not answer", endpoint),
            })??;
        info!("Connected to {} store {} at {}", status.engine, status.version, endpoint);
        Ok(store)
    }
}

/// Starts `quadstore serve` as a child process and talks to it over HTTP
///
/// A server already answering at the endpoint is reused instead. The child
/// is killed when the [`RemoteStore`] that owns it is dropped.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    program: PathBuf,
    client: Client,
}

impl ProcessConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            client: Client::new(),
        }
    }

    /// Connector for the configured server binary
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config
                .server_binary
                .clone()
                .unwrap_or_else(|| PathBuf::from(SERVER_PROGRAM)),
        )
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn spawn(&self, endpoint: &str, config: &StoreConfig) -> StoreResult<RemoteStore> {
        let port = local_port(endpoint)?;
        let config_file = ChildConfig::write(config).await?;

        let mut child = Command::new(&self.program)
            .arg("--config")
            .arg(config_file.path())
            .arg("serve")
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!("Started {} on port {} (pid {:?})", self.program.display(), port, child.id());

        let store = RemoteStore::new(self.client.clone(), endpoint, config);
        let deadline = Instant::now() + config.startup_timeout();
        loop {
            if let Some(exit) = child.try_wait()? {
                return Err(StoreError::ServerExited(format!("{} {}", self.program.display(), exit)));
            }
            match store.status().await {
                Ok(status) => {
                    info!("Spawned {} store {} answers at {}", status.engine, status.version, endpoint);
                    return Ok(store.with_process(ServerProcess { child, _config: config_file }));
                }
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(_) => tokio::time::sleep(STARTUP_POLL).await,
            }
        }
    }
}

#[async_trait]
impl OutOfProcessConnector for ProcessConnector {
    async fn connect(&self, endpoint: &str, config: &StoreConfig) -> StoreResult<RemoteStore> {
        let running = HttpConnector::with_client(self.client.clone());
        match running.connect(endpoint, config).await {
            Ok(store) => Ok(store),
            Err(e) => {
                debug!("No server at {} ({}), starting one", endpoint, e);
                self.spawn(endpoint, config).await
            }
        }
    }
}

/// Port of a loopback endpoint; servers are only started on this machine
fn local_port(endpoint: &str) -> StoreResult<u16> {
    let url = Url::parse(endpoint)
        .map_err(|e| StoreError::InvalidArgument(format!("bad endpoint {}: {}", endpoint, e)))?;
    let local = matches!(url.host_str(), Some("127.0.0.1" | "localhost" | "[::1]"));
    match url.port_or_known_default() {
        Some(port) if local => Ok(port),
        _ => Err(StoreError::InvalidArgument(format!(
            "cannot start a server for {}: not a local endpoint",
            endpoint
        ))),
    }
}

/// Configuration file handed to a child server, removed on drop
struct ChildConfig {
    path: PathBuf,
}

impl ChildConfig {
    async fn write(config: &StoreConfig) -> StoreResult<Self> {
        let path = std::env::temp_dir().join(format!("quadstore-{}.yaml", Uuid::new_v4()));
        tokio::fs::write(&path, config.to_yaml()?).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChildConfig {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// A server started by [`ProcessConnector`]
pub(super) struct ServerProcess {
    child: Child,
    _config: ChildConfig,
}

impl ServerProcess {
    pub(super) fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// A store handle from [`connect`]
pub enum Connection {
    Remote(RemoteStore),
    Embedded(Store),
}

impl Connection {
    pub fn is_remote(&self) -> bool {
        matches!(self, Connection::Remote(_))
    }

    /// The in-process store, when the connection fell back to one
    pub fn as_embedded(&self) -> Option<&Store> {
        match self {
            Connection::Embedded(store) => Some(store),
            Connection::Remote(_) => None,
        }
    }

    fn client(&self) -> &dyn SparqlClient {
        match self {
            Connection::Remote(store) => store as &dyn SparqlClient,
            Connection::Embedded(store) => store as &dyn SparqlClient,
        }
    }
}

#[async_trait]
impl SparqlClient for Connection {
    async fn execute(&self, query: &str) -> StoreResult<ExecutionOutcome> {
        self.client().execute(query).await
    }

    async fn execute_with_graphs(
        &self,
        query: &str,
        default_graphs: &[String],
        named_graphs: &[String],
    ) -> StoreResult<ExecutionOutcome> {
        self.client()
            .execute_with_graphs(query, default_graphs, named_graphs)
            .await
    }

    async fn insert(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        self.client().insert(triples, graph).await
    }

    async fn delete(&self, triples: &[Triple], graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        self.client().delete(triples, graph).await
    }

    async fn clear(&self, graph: Option<&NamedNode>) -> StoreResult<UpdateSummary> {
        self.client().clear(graph).await
    }

    async fn load(&self, source: LoadSource, graph: Option<&NamedNode>) -> StoreResult<usize> {
        self.client().load(source, graph).await
    }

    async fn graph(&self, graph: Option<&NamedNode>) -> StoreResult<Vec<Triple>> {
        self.client().graph(graph).await
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.client().status().await
    }
}

/// Build an in-process store
pub async fn create(config: StoreConfig) -> StoreResult<Store> {
    StoreBuilder::new(config).build().await
}

/// Reach the store at `endpoint` (default: the configured host and port),
/// falling back to an in-process store
pub async fn connect(endpoint: Option<&str>, config: StoreConfig) -> StoreResult<Connection> {
    StoreBuilder::new(config).connect(endpoint).await
}

/// [`connect`] with an explicit connector
pub async fn connect_with(
    connector: Arc<dyn OutOfProcessConnector>,
    endpoint: Option<&str>,
    config: StoreConfig,
) -> StoreResult<Connection> {
    StoreBuilder::new(config).connector(connector).connect(endpoint).await
}

pub(super) async fn connect_builder(builder: StoreBuilder, endpoint: Option<&str>) -> StoreResult<Connection> {
    let connector = builder
        .connector
        .clone()
        .unwrap_or_else(|| Arc::new(ProcessConnector::from_config(&builder.config)));
    let endpoint = endpoint.map_or_else(|| builder.config.endpoint(), str::to_string);

    let attempt = connector.connect(&endpoint, &builder.config).await;
    match attempt {
        Ok(remote) => Ok(Connection::Remote(remote)),
        Err(e) => {
            warn!("Out-of-process store unavailable ({}), creating one in-process", e);
            Ok(Connection::Embedded(builder.build().await?))
        }
    }
}

pub(super) async fn build_store(
    config: StoreConfig,
    transport: Option<Arc<dyn Transport>>,
    parsers: Vec<(String, Arc<dyn RdfParser>)>,
) -> StoreResult<Store> {
    config.validate()?;

    let transport = transport
        .unwrap_or_else(|| Arc::new(HttpTransport::new().with_timeout(config.request_timeout())));
    let mut loader = RdfLoader::new(transport);
    for (media_type, parser) in parsers {
        loader.register_parser(media_type, parser);
    }

    let backend = open_backend(&config).await?;
    info!("Store '{}' created ({:?} backend)", config.name, config.engine);
    let engine = SparqlEngine::new(backend, loader, &config);
    Ok(Store::from_engine(engine, config))
}

/// Open the configured backend off the async runtime
async fn open_backend(config: &StoreConfig) -> StoreResult<Box<dyn QuadBackend>> {
    match config.engine {
        EngineKind::Document => {
            let config = config.clone();
            let store = tokio::task::spawn_blocking(move || DocumentStore::open(&config)).await??;
            Ok(Box::new(store))
        }
        EngineKind::Embedded => {
            let snapshot_path = config.snapshot_path();
            let snapshot = if config.persistent && !config.overwrite {
                EmbeddedBackend::read_snapshot(&snapshot_path).await?
            } else {
                None
            };

            let tree_order = config.tree_order;
            let (lexicon, index) = tokio::task::spawn_blocking(move || {
                let mut index = QuadIndex::new(tree_order);
                match snapshot {
                    Some(data) => {
                        for key in data.quads {
                            index.insert(key);
                        }
                        (data.lexicon, index)
                    }
                    None => (Lexicon::new(), index),
                }
            })
            .await?;

            let backend = EmbeddedBackend::new(lexicon, index);
            Ok(if config.persistent {
                Box::new(backend.with_snapshot(snapshot_path))
            } else {
                Box::new(backend)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefusingConnector;

    #[async_trait]
    impl OutOfProcessConnector for RefusingConnector {
        async fn connect(&self, endpoint: &str, _config: &StoreConfig) -> StoreResult<RemoteStore> {
            Err(StoreError::Remote {
                status: 503,
                message: format!("{} refused", endpoint),
            })
        }
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_embedded() {
        let connection = connect_with(Arc::new(RefusingConnector), Some("http://127.0.0.1:1"), StoreConfig::default())
            .await
            .unwrap();
        assert!(!connection.is_remote());

        let status = connection.status().await.unwrap();
        assert_eq!(status.quads, 0);
        assert_eq!(status.engine, "embedded");
    }

    #[test]
    fn test_only_local_endpoints_are_spawned() {
        assert_eq!(local_port("http://127.0.0.1:8890").unwrap(), 8890);
        assert_eq!(local_port("http://localhost").unwrap(), 80);
        assert!(matches!(
            local_port("http://example.org:8890"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(local_port("not a url").is_err());
    }

    #[tokio::test]
    async fn test_missing_server_binary_falls_back() {
        let config = StoreConfig {
            server_binary: Some(PathBuf::from("/nonexistent/quadstore")),
            ..StoreConfig::default()
        };
        let connection = connect(Some("http://127.0.0.1:9"), config).await.unwrap();
        assert!(!connection.is_remote());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let config = StoreConfig {
            tree_order: 1,
            ..StoreConfig::default()
        };
        assert!(matches!(create(config).await, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_embedded_snapshot_survives_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            persistent: true,
            data_dir: dir.path().to_path_buf(),
            ..StoreConfig::default()
        };

        let store = create(config.clone()).await.unwrap();
        store
            .execute("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }")
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = create(config).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
    }
}
