use anyhow::{Context, Result};
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use search_core::persist::IndexPaths;
use search_core::tokenizer::tokenize;
use search_core::{MatchMode, RankingWeights, SearchEngine, SearchHit, SearchMetadata, SynonymTable, DEFAULT_TOP_K};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;
const SNIPPET_BEFORE: usize = 60;
const SNIPPET_LEN: usize = 200;

/// Everything needed to bring the query service up.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub index: PathBuf,
    pub synonyms: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    /// Ranking loop budget per request; unbounded when `None`.
    pub query_budget: Option<Duration>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_mode() -> String { "any".into() }
fn default_k() -> usize { DEFAULT_TOP_K }

#[derive(Deserialize)]
pub struct DocParams {
    pub id: String,
}

#[derive(Serialize)]
pub struct SearchReply {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<HitView>,
    pub metadata: SearchMetadata,
}

#[derive(Serialize)]
pub struct HitView {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub query_budget: Option<Duration>,
}

/// Load every artifact up front; a missing or corrupt one fails here rather
/// than on the first request.
pub fn load_engine(config: &ServerConfig) -> Result<SearchEngine> {
    let synonyms = match &config.synonyms {
        Some(path) => SynonymTable::load(path)?,
        None => SynonymTable::default(),
    };
    let weights = match &config.weights {
        Some(path) => RankingWeights::load(path)?,
        None => RankingWeights::default(),
    };
    SearchEngine::open(&IndexPaths::new(&config.index), synonyms, weights)
        .with_context(|| format!("loading index from {}", config.index.display()))
}

pub fn build_app(config: &ServerConfig) -> Result<Router> {
    let engine = load_engine(config)?;
    tracing::info!(corpus_size = engine.corpus_size(), "search engine ready");
    Ok(router(AppState { engine: Arc::new(engine), query_budget: config.query_budget }))
}

pub fn router(state: AppState) -> Router {
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
        .route("/search", get(search_handler))
        .route("/doc", get(doc_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchReply>, (StatusCode, String)> {
    let start = Instant::now();
    let mode: MatchMode = params.mode.parse().map_err(|e: search_core::Error| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let k = params.k.clamp(1, MAX_K);
    let deadline = state.query_budget.map(|budget| start + budget);

    let response = state.engine.search_until(&params.q, mode, k, deadline);
    let terms = tokenize(&params.q);
    let results = response
        .ranked_results
        .into_iter()
        .map(|hit| {
            let snippet = snippet(&hit.description, &terms);
            HitView { hit, snippet }
        })
        .collect();

    let elapsed = start.elapsed();
    Ok(Json(SearchReply {
        query: params.q,
        took_s: elapsed.as_secs_f64(),
        total_hits: response.metadata.candidate_count,
        results,
        metadata: response.metadata,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Query(params): Query<DocParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.engine.docs().get(&params.id) {
        Some(doc) => {
            let reviews = state.engine.indexes().reviews.get(&params.id);
            Ok(Json(serde_json::json!({
                "id": params.id,
                "title": doc.title,
                "description": doc.description,
                "reviews": reviews,
            })))
        }
        None => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })))),
    }
}

/// Window of `text` around the first query term, terms wrapped in `<em>`.
fn snippet(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let first = terms
        .iter()
        .filter_map(|t| find_case_insensitive(text, t))
        .min();
    let window: String = match first {
        Some(char_idx) => {
            let start = char_idx.saturating_sub(SNIPPET_BEFORE);
            text.chars().skip(start).take(SNIPPET_LEN).collect()
        }
        None => text.chars().take(SNIPPET_LEN).collect(),
    };
    Some(highlight_terms(&window, terms))
}

/// Char offset of the first case-insensitive occurrence of `needle`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let pat = term_pattern(needle)?;
    pat.find(haystack).map(|m| haystack[..m.start()].chars().count())
}

fn term_pattern(term: &str) -> Option<regex::Regex> {
    if term.trim().is_empty() { return None; }
    regex::RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        let Some(pat) = term_pattern(t) else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
