use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use quadstore::config::StoreConfig;
use quadstore::http::{SparqlRequest, SparqlServer};
use quadstore::sparql::{ExecutionOutcome, SparqlResults, N_TRIPLES, SPARQL_RESULTS_JSON};
use quadstore::store::{create, StoreStatus};
use serde_json::Value;
use tower::ServiceExt;

async fn server() -> SparqlServer {
    let store = create(StoreConfig::default()).await.unwrap();
    SparqlServer::new(store, 0)
}

/// Status, content type and raw body of a `/sparql` request
async fn post_raw(server: &SparqlServer, request: &SparqlRequest) -> (StatusCode, String, Vec<u8>) {
    let response = server
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sparql")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, bytes.to_vec())
}

async fn post(server: &SparqlServer, request: &SparqlRequest) -> (StatusCode, Value) {
    let (status, _, body) = post_raw(server, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_update_then_select_over_http() {
    let server = server().await;

    let (status, body) = post(
        &server,
        &SparqlRequest::new("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["update"]["inserted"], 1);

    let select = SparqlRequest::new("SELECT ?o WHERE { ?s ?p ?o }");
    let (status, content_type, raw) = post_raw(&server, &select).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, SPARQL_RESULTS_JSON);

    let body: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(body["head"]["vars"][0], "o");
    assert_eq!(body["results"]["bindings"][0]["o"]["value"], "1");

    match ExecutionOutcome::decode(&content_type, &raw).unwrap() {
        ExecutionOutcome::Results(SparqlResults::Bindings { solutions, .. }) => {
            assert_eq!(solutions.len(), 1)
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_graph_scope_over_http() {
    let server = server().await;
    post(
        &server,
        &SparqlRequest::new(
            "INSERT DATA { GRAPH <http://example.org/g> { <http://example.org/a> <http://example.org/p> 1 } }",
        ),
    )
    .await;

    let mut request = SparqlRequest::new("ASK { ?s ?p ?o }");
    let (_, body) = post(&server, &request).await;
    assert_eq!(body["boolean"], false);

    request.default_graph_uri = vec!["http://example.org/g".to_string()];
    let (_, body) = post(&server, &request).await;
    assert_eq!(body["boolean"], true);
}

#[tokio::test]
async fn test_construct_answers_ntriples() {
    let server = server().await;
    post(
        &server,
        &SparqlRequest::new("INSERT DATA { <http://example.org/a> <http://example.org/p> \"1\" }"),
    )
    .await;

    let (status, content_type, raw) = post_raw(
        &server,
        &SparqlRequest::new("CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, N_TRIPLES);
    assert_eq!(
        String::from_utf8(raw).unwrap().trim(),
        "<http://example.org/a> <http://example.org/p> \"1\" ."
    );
}

#[tokio::test]
async fn test_bad_query_is_rejected() {
    let server = server().await;
    let (status, body) = post(&server, &SparqlRequest::new("NOT SPARQL")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Parse error"));
}

#[tokio::test]
async fn test_status() {
    let server = server().await;
    let response = server
        .router()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let status: StoreStatus = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(status.status, "ok");
    assert_eq!(status.version, quadstore::VERSION);
    assert_eq!(status.engine, "embedded");
    assert_eq!(status.quads, 0);
}
