use quadstore::config::{EngineKind, StoreConfig};
use quadstore::rdf::{Literal, NamedNode, RdfPredicate, Triple};
use quadstore::sparql::SparqlResults;
use quadstore::store::{create, Store};
use quadstore::DEFAULT_GRAPH_URI;
use tempfile::TempDir;

fn node(iri: &str) -> NamedNode {
    NamedNode::new_unchecked(iri)
}

fn triple(s: &str, p: &str, o: &str) -> Triple {
    Triple::new(
        node(s).into(),
        RdfPredicate::from(node(p)),
        Literal::new_simple_literal(o).into(),
    )
}

async fn embedded() -> Store {
    let store = create(StoreConfig::default()).await.unwrap();
    store.set_prefix("ex", "http://example.org/");
    store
}

fn document_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        engine: EngineKind::Document,
        data_dir: dir.path().to_path_buf(),
        persistent: true,
        ..StoreConfig::default()
    }
}

async fn crud_scenario(store: &Store) {
    let graph = node("ex:g");
    let quad = triple("ex:a", "ex:p", "1");

    let summary = store.insert(&[quad.clone()], Some(&graph)).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(store.graph(Some(&graph)).await.unwrap(), vec![triple(
        "http://example.org/a",
        "http://example.org/p",
        "1"
    )]);

    // Inserting again adds nothing
    assert_eq!(store.insert(&[quad.clone()], Some(&graph)).await.unwrap().inserted, 0);

    let summary = store.delete(&[quad], Some(&graph)).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert!(store.graph(Some(&graph)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_select_after_insert() {
    let store = embedded().await;
    store.insert(&[triple("ex:a", "ex:p", "1")], None).await.unwrap();

    let outcome = store.execute("SELECT * WHERE { ?s ?p ?o }").await.unwrap();
    match outcome.results().unwrap() {
        SparqlResults::Bindings { variables, solutions } => {
            assert_eq!(variables.len(), 3);
            assert_eq!(solutions.len(), 1);
            assert_eq!(
                solutions[0].get("s").map(|t| t.value().to_string()),
                Some("http://example.org/a".to_string())
            );
        }
        other => panic!("expected bindings, got {:?}", other),
    }
}

#[tokio::test]
async fn test_embedded_crud() {
    let store = embedded().await;
    crud_scenario(&store).await;
}

#[tokio::test]
async fn test_document_crud() {
    let dir = TempDir::new().unwrap();
    let store = create(document_config(&dir)).await.unwrap();
    store.set_prefix("ex", "http://example.org/");
    assert_eq!(store.backend_name().await, "document");
    crud_scenario(&store).await;
}

#[tokio::test]
async fn test_document_store_reopens_with_data() {
    let dir = TempDir::new().unwrap();
    {
        let store = create(document_config(&dir)).await.unwrap();
        store
            .execute("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }")
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = create(document_config(&dir)).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 1);
    store.close().await.unwrap();

    let config = StoreConfig {
        overwrite: true,
        ..document_config(&dir)
    };
    let store = create(config).await.unwrap();
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_clear_defaults_to_default_graph() {
    let store = embedded().await;
    let graph = node("ex:g");
    store.insert(&[triple("ex:a", "ex:p", "1")], None).await.unwrap();
    store.insert(&[triple("ex:b", "ex:p", "2")], Some(&graph)).await.unwrap();

    let summary = store.clear(None).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert!(store.graph(None).await.unwrap().is_empty());
    assert_eq!(store.graph(Some(&graph)).await.unwrap().len(), 1);

    // Naming the default graph explicitly is the same graph
    store.insert(&[triple("ex:a", "ex:p", "1")], Some(&node(DEFAULT_GRAPH_URI))).await.unwrap();
    assert_eq!(store.graph(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_execute_with_graphs_overrides_from() {
    let store = embedded().await;
    store.insert(&[triple("ex:a", "ex:p", "1")], Some(&node("ex:g1"))).await.unwrap();
    store.insert(&[triple("ex:b", "ex:p", "2")], Some(&node("ex:g2"))).await.unwrap();

    let query = "SELECT ?s FROM <http://example.org/g1> WHERE { ?s ?p ?o }";
    let from = store.execute(query).await.unwrap();
    assert_eq!(from.results().unwrap().len(), 1);

    // Prefixed graph names are resolved, then replace FROM
    let scoped = store
        .execute_with_graphs(query, &["ex:g1".to_string(), "ex:g2".to_string()], &[])
        .await
        .unwrap();
    assert_eq!(scoped.results().unwrap().len(), 2);

    let named = store
        .execute_with_graphs(
            "SELECT ?g ?s WHERE { GRAPH ?g { ?s ?p ?o } }",
            &[],
            &["ex:g2".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(named.results().unwrap().len(), 1);
}

#[tokio::test]
async fn test_node_reads_one_subject() {
    let store = embedded().await;
    store
        .insert(
            &[
                triple("ex:a", "ex:p", "1"),
                triple("ex:a", "ex:q", "2"),
                triple("ex:b", "ex:p", "3"),
            ],
            None,
        )
        .await
        .unwrap();

    let triples = store.node(&node("ex:a"), None).await.unwrap();
    assert_eq!(triples.len(), 2);
}

#[tokio::test]
async fn test_unresolvable_names_are_sent_raw() {
    let store = embedded().await;
    // `nope:` is not a registered prefix but still a syntactically valid IRI
    store.insert(&[triple("nope:a", "ex:p", "1")], None).await.unwrap();
    let outcome = store
        .execute("ASK { <nope:a> <http://example.org/p> \"1\" }")
        .await
        .unwrap();
    assert_eq!(outcome.results(), Some(&SparqlResults::Boolean(true)));
}

#[tokio::test]
async fn test_invalid_query_is_an_error() {
    let store = embedded().await;
    assert!(store.execute("SELEKT nothing").await.is_err());
}

#[tokio::test]
async fn test_term_factory_uses_store_prefixes() {
    let store = embedded().await;
    let rdf = store.rdf();
    // Names stay as written; resolution happens when they are serialized
    assert_eq!(rdf.create_named_node("ex:a").as_str(), "ex:a");
    assert_eq!(rdf.resolve("ex:a").as_deref(), Some("http://example.org/a"));

    store.register_default_profile_namespaces();
    let outcome = store
        .execute("SELECT * WHERE { ?s skos:prefLabel ?o }")
        .await
        .unwrap();
    assert!(outcome.results().unwrap().is_empty());
}
