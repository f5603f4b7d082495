pub mod engine;
pub mod suggest;
pub mod topk;

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use sift_core::persist::is_valid_key;
use sift_core::{DataPaths, DocMetadata, DocumentStore, FsDocumentStore, SledStore};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use engine::{RankingConfig, RankingEngine, SearchPage};
pub use suggest::Suggester;
pub use topk::Candidate;

pub const DEFAULT_COUNT: i32 = 10;
pub const MAX_COUNT: i32 = 100;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_page")]
    pub page: i32,
    #[serde(default = "default_count")]
    pub count: i32,
}
fn default_page() -> i32 { 1 }
fn default_count() -> i32 { DEFAULT_COUNT }

#[derive(Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total: u64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize, Deserialize)]
pub struct SearchHit {
    pub doc: DocMetadata,
    pub score: f64,
    pub matched_terms: u32,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub prefix: String,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RankingEngine>,
    pub docs: Arc<dyn DocumentStore>,
    pub suggester: Arc<Suggester>,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Reads the admin token from `ADMIN_TOKEN`.
    pub fn new(engine: Arc<RankingEngine>, docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            engine,
            docs,
            suggester: Arc::new(Suggester::new()),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }
}

/// Opens the metadata and index stores under `data_dir`.
pub fn open_state(data_dir: &std::path::Path, config: RankingConfig) -> Result<AppState> {
    let paths = DataPaths::new(data_dir);
    let kv = SledStore::open(paths.index())?;
    let docs = FsDocumentStore::open(paths.metadata())?;
    let engine = RankingEngine::new(Arc::new(kv), config)?;
    let stats = engine.stats();
    tracing::info!(total_docs = stats.total_docs, avg_doc_length = stats.avg_doc_length, built_at = %stats.built_at, "index loaded");
    Ok(AppState::new(Arc::new(engine), Arc::new(docs)))
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search_handler))
        .route("/suggest", get(suggest_handler))
        .route("/doc/:hash", get(doc_handler))
        .route("/admin/reset", post(reset_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

type ApiError = (StatusCode, String);

fn internal<E: std::fmt::Display>(err: E) -> ApiError {
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub async fn search_handler(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let page = req.page.max(1) as usize;
    let count = req.count.clamp(1, MAX_COUNT) as usize;

    let query = req.query.clone();
    let (found, metas) = tokio::task::spawn_blocking(move || -> Result<(SearchPage, Vec<DocMetadata>)> {
        let found = state.engine.search(&query, page, count)?;
        let hashes: Vec<String> = found.results.iter().map(|c| c.doc.clone()).collect();
        let metas = if hashes.is_empty() {
            Vec::new()
        } else {
            state.docs.get_batch_metadata(&hashes).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "metadata lookup failed");
                Vec::new()
            })
        };
        state.suggester.record(&query);
        Ok((found, metas))
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;

    let mut by_hash: HashMap<String, DocMetadata> = metas.into_iter().map(|m| (m.hash.clone(), m)).collect();
    let results = found
        .results
        .into_iter()
        .map(|c| SearchHit {
            doc: by_hash.remove(&c.doc).unwrap_or_else(|| DocMetadata::hash_only(&c.doc)),
            score: c.score,
            matched_terms: c.matched,
        })
        .collect();

    Ok(Json(SearchResponse {
        query: req.query,
        took_s: start.elapsed().as_secs_f64(),
        total: found.total as u64,
        results,
    }))
}

pub async fn suggest_handler(State(state): State<AppState>, Query(params): Query<SuggestParams>) -> Json<SuggestResponse> {
    let limit = params.limit.unwrap_or(suggest::DEFAULT_LIMIT).min(suggest::CANDIDATE_CAP);
    Json(SuggestResponse { suggestions: state.suggester.suggest(&params.prefix, limit) })
}

pub async fn doc_handler(State(state): State<AppState>, Path(hash): Path<String>) -> Result<Json<DocMetadata>, ApiError> {
    if !is_valid_key(&hash) {
        return Err((StatusCode::NOT_FOUND, "not found".into()));
    }
    let meta = tokio::task::spawn_blocking(move || state.docs.get_metadata(&hash))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    match meta {
        Some(meta) => Ok(Json(meta)),
        None => Err((StatusCode::NOT_FOUND, "not found".into())),
    }
}

async fn reset_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let stats = tokio::task::spawn_blocking(move || engine.reset().map(|_| engine.stats()))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    tracing::info!(total_docs = stats.total_docs, "result cache reset");
    Ok(Json(serde_json::json!({ "status": "ok", "total_docs": stats.total_docs })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
