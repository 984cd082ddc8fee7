use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use search_core::persist::{load_snapshot, IndexSnapshot};
use search_core::{Artifact, FuzzyOptions, SearchFilters, SearchOptions, SortBy, SortOrder};
use search_pool::{PoolConfig, PoolError, PoolManager, TaskCallbacks, TaskOutput, TaskPayload, WorkerType};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Snapshot imported into the primary search worker at startup.
    pub snapshot: Option<PathBuf>,
    pub pool: PoolConfig,
    pub admin_token: Option<String>,
    /// Comma-separated list of allowed origins; any origin when unset.
    pub cors_allow_origin: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<PoolManager>,
    pub admin_token: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub language: Option<String>,
    /// Comma-separated; a hit needs any one of them.
    pub tags: Option<String>,
}
fn default_limit() -> usize { 20 }

impl SearchParams {
    fn options(&self) -> SearchOptions {
        let tags = self
            .tags
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        SearchOptions {
            limit: self.limit.clamp(1, 100),
            offset: self.offset,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            filters: SearchFilters { artifact_type: self.artifact_type.clone(), language: self.language.clone(), tags },
        }
    }
}

#[derive(Deserialize)]
pub struct FuzzyParams {
    pub max_distance: Option<usize>,
    pub min_similarity: Option<f64>,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    pub q: String,
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
}
fn default_suggest_limit() -> usize { 10 }

pub async fn build_app(config: AppConfig) -> Result<Router> {
    let pool = Arc::new(PoolManager::new(&config.pool)?);
    if let Some(path) = &config.snapshot {
        let snapshot = load_snapshot(path)?;
        match run_task(&pool, TaskPayload::ImportIndex(Box::new(snapshot))).await {
            Ok(TaskOutput::Imported { artifacts, terms }) => {
                tracing::info!(path = %path.display(), artifacts, terms, "loaded index snapshot");
            }
            Ok(_) => {}
            Err((_, msg)) => anyhow::bail!("failed to import snapshot {}: {msg}", path.display()),
        }
    }
    let state = AppState { pool, admin_token: config.admin_token };

    let cors = cors_layer(config.cors_allow_origin.as_deref());

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/search/advanced", get(advanced_search_handler))
        .route("/search/fuzzy", get(fuzzy_search_handler))
        .route("/suggest", get(suggest_handler))
        .route("/stats", get(stats_handler))
        .route("/analyze", post(analyze_handler))
        .route("/index", post(index_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/doc/:id", put(update_handler).delete(remove_handler))
        .route("/index/clear", post(clear_handler))
        .route("/index/export", get(export_handler))
        .route("/index/import", post(import_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

/// Listed origins only; any origin when none parse.
fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allow_origin
        .into_iter()
        .flat_map(|list| list.split(','))
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Submit a task and wait for its terminal message.
async fn run_task(pool: &PoolManager, task: TaskPayload) -> Result<TaskOutput, ApiError> {
    let worker_type = task.worker_type();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let err_tx = tx.clone();
    let callbacks = TaskCallbacks::new()
        .on_success(move |output| {
            let _ = tx.send(Ok(output));
        })
        .on_error(move |error| {
            let _ = err_tx.send(Err(error));
        });
    pool.submit_task(worker_type, task, callbacks).map_err(pool_error)?;
    match rx.recv().await {
        Some(Ok(output)) => Ok(output),
        Some(Err(error)) => Err((StatusCode::UNPROCESSABLE_ENTITY, error)),
        None => Err((StatusCode::SERVICE_UNAVAILABLE, "task was abandoned; try again".into())),
    }
}

fn pool_error(err: PoolError) -> ApiError {
    match err {
        PoolError::NoAvailableWorker(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<TaskOutput> {
    let task = TaskPayload::Search { options: params.options(), query: params.q };
    run_task(&state.pool, task).await.map(Json)
}

pub async fn advanced_search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<TaskOutput> {
    let task = TaskPayload::AdvancedSearch { options: params.options(), query: params.q };
    run_task(&state.pool, task).await.map(Json)
}

pub async fn fuzzy_search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    Query(fuzzy): Query<FuzzyParams>,
) -> ApiResult<TaskOutput> {
    let defaults = FuzzyOptions::default();
    let options = FuzzyOptions {
        max_distance: fuzzy.max_distance.unwrap_or(defaults.max_distance),
        min_similarity: fuzzy.min_similarity.unwrap_or(defaults.min_similarity),
        search: params.options(),
    };
    let task = TaskPayload::FuzzySearch { query: params.q, options };
    run_task(&state.pool, task).await.map(Json)
}

pub async fn suggest_handler(State(state): State<AppState>, Query(params): Query<SuggestParams>) -> ApiResult<TaskOutput> {
    let task = TaskPayload::GetSuggestions { query: params.q, limit: params.limit.clamp(1, 50) };
    run_task(&state.pool, task).await.map(Json)
}

pub async fn stats_handler(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let index = run_task(&state.pool, TaskPayload::GetIndexStats).await?;
    Ok(Json(serde_json::json!({ "index": index, "pool": state.pool.stats() })))
}

pub async fn analyze_handler(State(state): State<AppState>, Json(artifact): Json<Artifact>) -> ApiResult<TaskOutput> {
    run_task(&state.pool, TaskPayload::ProcessArtifact(artifact)).await.map(Json)
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap, Json(artifact): Json<Artifact>) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    let artifact = match run_task(&state.pool, TaskPayload::ProcessArtifact(artifact)).await? {
        TaskOutput::Analysis { artifact, .. } => artifact,
        _ => return Err((StatusCode::INTERNAL_SERVER_ERROR, "unexpected analysis output".into())),
    };
    run_task(&state.pool, TaskPayload::IndexArtifact(artifact)).await.map(Json)
}

async fn index_batch(State(state): State<AppState>, headers: HeaderMap, Json(artifacts): Json<Vec<Artifact>>) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    run_task(&state.pool, TaskPayload::IndexBatch(artifacts)).await.map(Json)
}

async fn update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut artifact): Json<Artifact>,
) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    artifact.id = id;
    run_task(&state.pool, TaskPayload::UpdateIndex(artifact)).await.map(Json)
}

async fn remove_handler(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    run_task(&state.pool, TaskPayload::RemoveFromIndex { id }).await.map(Json)
}

async fn clear_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    run_task(&state.pool, TaskPayload::ClearIndex).await.map(Json)
}

async fn export_handler(State(state): State<AppState>) -> ApiResult<TaskOutput> {
    run_task(&state.pool, TaskPayload::ExportIndex).await.map(Json)
}

async fn import_handler(State(state): State<AppState>, headers: HeaderMap, Json(snapshot): Json<IndexSnapshot>) -> ApiResult<TaskOutput> {
    authorize(&state, &headers)?;
    run_task(&state.pool, TaskPayload::ImportIndex(Box::new(snapshot))).await.map(Json)
}

/// Mutations are open unless an admin token is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(required) = &state.admin_token else {
        return Ok(());
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
