use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use search_core::index::build_all;
use search_core::pagerank::{compute_authority, EngineKind};
use search_core::persist::{save_store, IndexPaths};
use search_core::store::MemoryStore;
use search_core::Config;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(dir: &std::path::Path) {
    let config = Config::default();
    let mut store = MemoryStore::new();
    let a = store.add_document("http://a.test", "Doc A", "Rust is great. rust systems programming.");
    let b = store.add_document("http://b.test", "Doc B", "Learning rust with friends and other people.");
    let c = store.add_document("http://c.test", "Doc C", "Nothing relevant here.");
    store.add_link(a, "http://b.test").unwrap();
    store.add_link(b, "http://a.test").unwrap();
    store.add_link(c, "http://a.test").unwrap();
    build_all(&mut store, &config.stop_words()).unwrap();
    compute_authority(&mut store, EngineKind::MapReduce, &config.pagerank).unwrap();
    save_store(&IndexPaths::new(dir), &store).unwrap();
}

fn app(dir: &std::path::Path) -> Router {
    server::build_app(&dir.to_string_lossy(), &Config::default()).unwrap()
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let (status, body) = call(app(dir.path()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, body) = call(app(dir.path()), "/search?q=rust&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["strategy"], "term");
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    // doc A has the higher tf and the higher authority
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 0);
    assert_eq!(arr[1]["doc_id"].as_u64().unwrap(), 1);
    assert!(arr[0]["snippet"].as_str().unwrap().contains("Rust"));
}

#[tokio::test]
async fn strategies_agree_over_http() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (_, term) = call(app(dir.path()), "/search?q=rust+programming&strategy=term").await;
    let (_, doc) = call(app(dir.path()), "/search?q=rust+programming&strategy=document").await;
    let term: Value = serde_json::from_slice(&term).unwrap();
    let doc: Value = serde_json::from_slice(&doc).unwrap();
    assert_eq!(doc["strategy"], "document");
    assert_eq!(term["results"], doc["results"]);
}

#[tokio::test]
async fn unknown_strategy_falls_back_and_k_is_clamped() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, body) = call(app(dir.path()), "/search?q=rust&k=0&strategy=bogus&authority=false").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["strategy"], "term");
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
    assert_eq!(json["total_hits"], 2);
}

#[tokio::test]
async fn stop_word_query_is_empty() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, body) = call(app(dir.path()), "/search?q=the+and").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_hits"], 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn doc_lookup_and_missing_doc() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, body) = call(app(dir.path()), "/doc/1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["url"], "http://b.test");
    assert_eq!(json["incoming"], serde_json::json!([0]));
    assert!(json["authority"].as_f64().unwrap() > 0.0);

    let (status, _) = call(app(dir.path()), "/doc/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authority_top_is_sorted() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, body) = call(app(dir.path()), "/authority/top?n=3").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 3);
    assert_eq!(arr[0]["url"], "http://a.test");
    let scores: Vec<f64> = arr.iter().map(|e| e["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}
