use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use search_core::pagerank::AuthorityScores;
use search_core::persist::{load_store, IndexPaths};
use search_core::store::{DocumentStore, MemoryStore};
use search_core::{Config, DocId, QueryEngine, SearchHit, Strategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// `term` or `document`; anything else falls back to term-at-a-time
    pub strategy: Option<String>,
    #[serde(default = "default_authority")]
    pub authority: bool,
}
fn default_k() -> usize { 10 }
fn default_authority() -> bool { true }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub strategy: Strategy,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub struct TopParams {
    #[serde(default = "default_k")]
    pub n: usize,
}

#[derive(Serialize)]
pub struct AuthorityEntry {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine<Arc<MemoryStore>>>,
}

pub fn build_app(index_dir: &str, config: &Config) -> Result<Router> {
    let store = Arc::new(load_store(&IndexPaths::new(index_dir))?);
    tracing::info!(index_dir, documents = store.stats().documents, "loaded index snapshot");
    let engine = QueryEngine::new(store, config.search.clone(), config.stop_words())?;
    Ok(router(AppState { engine: Arc::new(engine) }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/authority/top", get(authority_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn internal(err: search_core::Error) -> ApiError {
    tracing::error!(%err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let strategy = params.strategy.as_deref().map(Strategy::parse_lenient).unwrap_or_default();
    let k = params.k.clamp(1, 100);
    let page = state.engine.search_page(&params.q, strategy, params.authority, k).map_err(internal)?;
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: page.total_hits,
        strategy,
        results: page.hits,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.engine.store();
    let Some(doc) = store.get(doc_id) else {
        return Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found")));
    };
    let outgoing: Vec<String> = store.outgoing_links(doc_id).map_err(internal)?.into_iter().map(|l| l.target_url).collect();
    let incoming = store.incoming_links(doc_id).map_err(internal)?;
    let authority = store.authority(doc_id).map(|(score, _)| score);
    Ok(Json(serde_json::json!({
        "doc_id": doc_id,
        "title": doc.title,
        "url": doc.url,
        "text": doc.content,
        "authority": authority,
        "outgoing": outgoing,
        "incoming": incoming,
    })))
}

pub async fn authority_handler(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Result<Json<Vec<AuthorityEntry>>, ApiError> {
    let store = state.engine.store();
    let scores = AuthorityScores::new(0, store.authority_scores().map_err(internal)?);
    let entries = scores
        .top(params.n.clamp(1, 100))
        .into_iter()
        .filter_map(|(doc_id, score)| {
            store.get(doc_id).map(|d| AuthorityEntry { doc_id, score, title: d.title.clone(), url: d.url.clone() })
        })
        .collect();
    Ok(Json(entries))
}
