use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sitesearch_core::search::{DEFAULT_LIMIT, EMPTY_QUERY, SEARCH_FAILED};
use sitesearch_core::{SearchEngine, SearchResponse, Store};
use sitesearch_crawler::Orchestrator;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod stats;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub search: Arc<SearchEngine>,
    pub store: Arc<dyn Store>,
    /// When set, indexing endpoints require a matching `X-ADMIN-TOKEN` header.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let store = Arc::clone(orchestrator.store());
        Self {
            search: Arc::new(SearchEngine::new(Arc::clone(&store))),
            orchestrator,
            store,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiStatus {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type ApiReply = (StatusCode, Json<ApiStatus>);

fn ok() -> ApiReply {
    (StatusCode::OK, Json(ApiStatus { result: true, error: None }))
}

fn reject(status: StatusCode, error: impl Into<String>) -> ApiReply {
    (status, Json(ApiStatus { result: false, error: Some(error.into()) }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct IndexPageParams {
    #[serde(default)]
    pub url: String,
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
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
        .route("/api/startIndexing", get(start_indexing))
        .route("/api/stopIndexing", get(stop_indexing))
        .route("/api/indexPage", post(index_page))
        .route("/api/search", get(search_handler))
        .route("/api/statistics", get(statistics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn start_indexing(State(state): State<AppState>, headers: HeaderMap) -> ApiReply {
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    match state.orchestrator.start() {
        Ok(()) => ok(),
        Err(err) => reject(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

pub async fn stop_indexing(State(state): State<AppState>, headers: HeaderMap) -> ApiReply {
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    match state.orchestrator.stop().await {
        Ok(()) => ok(),
        Err(err) => reject(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

pub async fn index_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<IndexPageParams>,
) -> ApiReply {
    if let Err(reply) = authorize(&state, &headers) {
        return reply;
    }
    let url = params.url.trim();
    if url.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "url must not be empty");
    }
    match state.orchestrator.try_index_single_page(url).await {
        Ok(true) => ok(),
        Ok(false) => reject(StatusCode::OK, "page could not be indexed"),
        Err(err) => reject(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    if params.query.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(SearchResponse::failure(EMPTY_QUERY)));
    }
    let resp = state.search.search(&params.query, params.site.as_deref(), params.offset, params.limit);
    let status = match resp.error.as_deref() {
        None => StatusCode::OK,
        Some(SEARCH_FAILED) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(resp))
}

pub async fn statistics_handler(
    State(state): State<AppState>,
) -> Result<Json<stats::StatisticsResponse>, ApiReply> {
    let indexing = state.orchestrator.is_indexing_in_progress();
    stats::collect(state.orchestrator.config(), state.store.as_ref(), indexing).map(Json).map_err(|err| {
        tracing::error!("statistics failed: {err:#}");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "statistics unavailable")
    })
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiReply> {
    let Some(required) = &state.admin_token else { return Ok(()) };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(reject(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
