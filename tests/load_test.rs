use async_trait::async_trait;
use quadstore::config::StoreConfig;
use quadstore::engine::LoadError;
use quadstore::rdf::{NamedNode, Triple, TriplePattern};
use quadstore::sparql::{SparqlError, SparqlResults};
use quadstore::store::{LoadSource, Store, StoreError};
use quadstore::transport::{Transport, TransportError, TransportResponse, TransportResult};
use quadstore::ChangeEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const PEOPLE: &str = r#"
@prefix foaf: <http://xmlns.com/foaf/0.1/> .
@prefix ex: <http://example.org/> .

ex:alice foaf:name "Alice" ; foaf:knows ex:bob .
ex:bob foaf:name "Bob" .
"#;

/// Serves one Turtle document and records what was requested
#[derive(Default)]
struct FixtureTransport {
    requests: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn load(&self, uri: &str, _accept: &str) -> TransportResult<TransportResponse> {
        self.requests.lock().unwrap().push(uri.to_string());
        Ok(TransportResponse {
            body: PEOPLE.to_string(),
            content_type: Some("text/turtle".to_string()),
        })
    }
}

/// Holds every fetch until released
#[derive(Default)]
struct GatedTransport {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn load(&self, _uri: &str, _accept: &str) -> TransportResult<TransportResponse> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(TransportResponse {
            body: PEOPLE.to_string(),
            content_type: Some("text/turtle".to_string()),
        })
    }
}

/// Every fetch fails with a 404
struct MissingTransport;

#[async_trait]
impl Transport for MissingTransport {
    async fn load(&self, uri: &str, _accept: &str) -> TransportResult<TransportResponse> {
        Err(TransportError::Status {
            uri: uri.to_string(),
            status: 404,
        })
    }
}

async fn store_with(transport: Arc<FixtureTransport>, config: StoreConfig) -> Store {
    let store = Store::builder(config).transport(transport).build().await.unwrap();
    store.set_prefix("ex", "http://example.org/");
    store
}

fn counter(hits: &Arc<Mutex<usize>>) -> impl Fn(ChangeEvent, Vec<Triple>) + Send + Sync + 'static {
    let hits = hits.clone();
    move |_: ChangeEvent, triples: Vec<Triple>| *hits.lock().unwrap() += triples.len()
}

#[tokio::test]
async fn test_remote_load_resolves_against_base() {
    let transport = Arc::new(FixtureTransport::default());
    let config = StoreConfig {
        base_uri: Some("http://example.org/data/".to_string()),
        ..StoreConfig::default()
    };
    let store = store_with(transport.clone(), config).await;

    let graph = NamedNode::new_unchecked("ex:people");
    let loaded = store
        .load(LoadSource::remote("people.ttl"), Some(&graph))
        .await
        .unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(
        *transport.requests.lock().unwrap(),
        vec!["http://example.org/data/people.ttl".to_string()]
    );
    assert_eq!(store.graph(Some(&graph)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_inline_load_into_default_graph() {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    let loaded = store
        .load(LoadSource::inline("text/turtle", PEOPLE), None)
        .await
        .unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(store.graph(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_file_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("people.nt");
    std::fs::write(
        &path,
        "<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> \"Alice\" .\n",
    )
    .unwrap();

    let store = store_with(Arc::default(), StoreConfig::default()).await;
    let loaded = store
        .load(LoadSource::file("application/n-triples", &path), None)
        .await
        .unwrap();
    assert_eq!(loaded, 1);
}

#[tokio::test]
async fn test_unknown_media_type_fails_when_used() {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    let result = store
        .load(LoadSource::inline("application/x-unknown", PEOPLE), None)
        .await;
    assert!(matches!(
        result,
        Err(StoreError::Load(LoadError::UnknownMediaType(_)))
    ));
}

#[tokio::test]
async fn test_batch_load_events_are_off_by_default() {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    let hits = Arc::new(Mutex::new(0));
    let default_graph = NamedNode::new_unchecked(quadstore::DEFAULT_GRAPH_URI);
    store
        .subscribe(&TriplePattern::default(), &default_graph, counter(&hits))
        .await
        .unwrap();

    store.load(LoadSource::inline("text/turtle", PEOPLE), None).await.unwrap();
    store.load(LoadSource::remote("http://example.org/people.ttl"), None).await.unwrap();
    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_batch_load_events_when_enabled() {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    store.set_batch_load_events(true).await;

    let hits = Arc::new(Mutex::new(0));
    let default_graph = NamedNode::new_unchecked(quadstore::DEFAULT_GRAPH_URI);
    store
        .subscribe(&TriplePattern::default(), &default_graph, counter(&hits))
        .await
        .unwrap();

    store.load(LoadSource::inline("text/turtle", PEOPLE), None).await.unwrap();
    assert_eq!(*hits.lock().unwrap(), 3);
}

#[tokio::test]
async fn test_registered_parser_is_used() {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    store
        .register_parser(
            "application/x-turtle",
            Arc::new(quadstore::rdf::FormatParser::new(quadstore::RdfFormat::Turtle)),
        )
        .await;
    let loaded = store
        .load(LoadSource::inline("application/x-turtle", PEOPLE), None)
        .await
        .unwrap();
    assert_eq!(loaded, 3);
}

#[tokio::test]
async fn test_pending_remote_load_does_not_block_queries() {
    let transport = Arc::new(GatedTransport::default());
    let store = Store::builder(StoreConfig::default())
        .transport(transport.clone())
        .build()
        .await
        .unwrap();

    let loading = tokio::spawn({
        let store = store.clone();
        async move {
            store
                .load(LoadSource::remote("http://example.org/people.ttl"), None)
                .await
        }
    });
    transport.started.notified().await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), store.execute("ASK { ?s ?p ?o }"))
        .await
        .expect("query waited for the fetch")
        .unwrap();
    assert_eq!(outcome.results(), Some(&SparqlResults::Boolean(false)));

    transport.release.notify_one();
    assert_eq!(loading.await.unwrap().unwrap(), 3);
    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_failed_load_still_notifies_earlier_inserts() {
    let store = Store::builder(StoreConfig::default())
        .transport(Arc::new(MissingTransport))
        .build()
        .await
        .unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let default_graph = NamedNode::new_unchecked(quadstore::DEFAULT_GRAPH_URI);
    store
        .subscribe(&TriplePattern::default(), &default_graph, move |event, triples: Vec<Triple>| {
            sink.lock().unwrap().push((event, triples.len()));
        })
        .await
        .unwrap();

    let result = store
        .execute(
            "INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" } ; \
             LOAD <http://example.org/missing.ttl>",
        )
        .await;
    assert!(matches!(result, Err(StoreError::Sparql(SparqlError::Load(_)))));
    assert_eq!(store.len().await.unwrap(), 1);
    assert_eq!(*events.lock().unwrap(), vec![(ChangeEvent::Added, 1)]);
}

/// Node and query observers follow the batch-load flag like pattern subscriptions
async fn observer_hits(batch_events: bool) -> (usize, usize) {
    let store = store_with(Arc::default(), StoreConfig::default()).await;
    store.set_batch_load_events(batch_events).await;

    let node_hits = Arc::new(Mutex::new(0));
    let sink = node_hits.clone();
    store
        .start_observing_node(&NamedNode::new_unchecked("ex:alice"), None, move |_| {
            *sink.lock().unwrap() += 1;
        })
        .await
        .unwrap();

    let query_hits = Arc::new(Mutex::new(0));
    let sink = query_hits.clone();
    store
        .start_observing_query(
            "SELECT ?name WHERE { ?s <http://xmlns.com/foaf/0.1/name> ?name }",
            move |_: &SparqlResults| *sink.lock().unwrap() += 1,
        )
        .await
        .unwrap();

    store.load(LoadSource::inline("text/turtle", PEOPLE), None).await.unwrap();
    store.load(LoadSource::remote("http://example.org/other.ttl"), None).await.unwrap();
    let hits = (*node_hits.lock().unwrap(), *query_hits.lock().unwrap());
    hits
}

#[tokio::test]
async fn test_batch_load_flag_covers_node_and_query_observers() {
    assert_eq!(observer_hits(false).await, (0, 0));
    // The second load repeats the first, so only the first one changes anything
    assert_eq!(observer_hits(true).await, (1, 1));
}
