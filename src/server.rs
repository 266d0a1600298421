//! JSON HTTP adapter over [`RagService`](nancy_brain_core::RagService).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Corpus status, index version, document count |
//! | `GET`  | `/version` | Crate version and embedding models |
//! | `POST` | `/search` | Weighted semantic search |
//! | `POST` | `/retrieve` | One passage by doc id or chunk id |
//! | `POST` | `/retrieve/batch` | Many passages, failures isolated per item |
//! | `GET`  | `/tree` | Directory listing of the corpus |
//! | `POST` | `/weights` | Set a runtime doc weight |
//! | `DELETE` | `/weights` | Clear a runtime doc weight |
//! | `POST` | `/reload` | Re-ingest the corpus and publish a new snapshot |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: doc 'x/y/z.md'" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `validation_error` | 400 |
//! | `not_found` | 404 |
//! | `timeout` | 408 |
//! | `embedding_error`, `config_error`, `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nancy_brain_core::models::{
    BatchItem, BatchResult, HealthView, Passage, SearchResponse, TreeView,
};
use nancy_brain_core::search::SearchRequest;
use nancy_brain_core::CoreError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::service::App;

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    app: Arc<App>,
    timeout: Duration,
}

/// Build the router without binding, so tests can serve it on any listener.
pub fn router(app: Arc<App>) -> Router {
    let timeout = Duration::from_secs(app.config().server.request_timeout_secs.max(1));
    let state = AppState { app, timeout };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/search", post(handle_search))
        .route("/retrieve", post(handle_retrieve))
        .route("/retrieve/batch", post(handle_retrieve_batch))
        .route("/tree", get(handle_tree))
        .route("/weights", post(handle_set_weight).delete(handle_clear_weight))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .with_state(state)
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(app: Arc<App>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let router = router(app);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Nancy Brain listening on http://{}", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = match err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Embedding(_) | CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<CoreError>() {
            Some(core) => core.clone().into(),
            None => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message: format!("{:#}", err),
            },
        }
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

/// Run `fut` under the configured request timeout.
///
/// Dropping the future on timeout is safe: the core holds no partially
/// mutated state while a query is in flight.
async fn with_timeout<T, E, F>(state: &AppState, what: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    match tokio::time::timeout(state.timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(timeout_error(format!(
            "{} timed out after {}s",
            what,
            state.timeout.as_secs()
        ))),
    }
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthView> {
    Json(state.app.service().health())
}

// ============ GET /version ============

#[derive(Serialize)]
struct VersionResponse {
    name: &'static str,
    /// The crate version from `Cargo.toml`.
    version: &'static str,
    index_version: String,
    embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_model: Option<String>,
}

async fn handle_version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        index_version: state.app.service().snapshot().index_version().to_string(),
        embedding_model: state.app.general_model().to_string(),
        code_model: state.app.code_model().map(str::to_string),
    })
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default, alias = "toolkit")]
    category: Option<String>,
    #[serde(default)]
    doctype: Option<String>,
    #[serde(default)]
    explain: bool,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let mut req = SearchRequest::new(&body.query);
    req.limit = body
        .limit
        .unwrap_or(state.app.config().retrieval.default_limit);
    req.threshold = body.threshold.unwrap_or(0.0);
    req.category = body.category.as_deref();
    req.doctype = body.doctype.as_deref();
    req.explain = body.explain;

    let response = with_timeout(&state, "search", state.app.service().search(&req)).await?;
    tracing::debug!(query = %body.query, hits = response.hits.len(), "search served");
    Ok(Json(response))
}

// ============ POST /retrieve ============

#[derive(Serialize)]
struct RetrieveResponse {
    passage: Passage,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(item): Json<BatchItem>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let passage = state
        .app
        .service()
        .retrieve(&item.doc_id, item.start, item.end, item.window)?;
    Ok(Json(RetrieveResponse { passage }))
}

// ============ POST /retrieve/batch ============

#[derive(Deserialize)]
struct BatchBody {
    items: Vec<BatchItem>,
}

#[derive(Serialize)]
struct BatchResponse {
    passages: Vec<BatchResult>,
}

async fn handle_retrieve_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchBody>,
) -> Json<BatchResponse> {
    let passages = state.app.service().retrieve_batch(&body.items);
    Json(BatchResponse { passages })
}

// ============ GET /tree ============

#[derive(Deserialize)]
struct TreeParams {
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default, alias = "depth")]
    max_depth: Option<usize>,
    #[serde(default)]
    max_entries: Option<usize>,
}

async fn handle_tree(
    State(state): State<AppState>,
    Query(params): Query<TreeParams>,
) -> Result<Json<TreeView>, AppError> {
    let tree = state
        .app
        .service()
        .list_tree(params.prefix.as_deref(), params.max_depth, params.max_entries)?;
    Ok(Json(tree))
}

// ============ POST/DELETE /weights ============

#[derive(Deserialize)]
struct SetWeightBody {
    doc_id: String,
    multiplier: f64,
}

#[derive(Deserialize)]
struct ClearWeightParams {
    doc_id: String,
}

#[derive(Serialize)]
struct WeightResponse {
    ok: bool,
    doc_id: String,
    previous: Option<f64>,
}

async fn handle_set_weight(
    State(state): State<AppState>,
    Json(body): Json<SetWeightBody>,
) -> Result<Json<WeightResponse>, AppError> {
    let previous = state.app.set_weight(&body.doc_id, body.multiplier).await?;
    Ok(Json(WeightResponse {
        ok: true,
        doc_id: body.doc_id,
        previous,
    }))
}

async fn handle_clear_weight(
    State(state): State<AppState>,
    Query(params): Query<ClearWeightParams>,
) -> Result<Json<WeightResponse>, AppError> {
    let previous = state.app.clear_weight(&params.doc_id).await?;
    Ok(Json(WeightResponse {
        ok: true,
        doc_id: params.doc_id,
        previous,
    }))
}

// ============ POST /reload ============

async fn handle_reload(State(state): State<AppState>) -> Result<Json<HealthView>, AppError> {
    state.app.reload().await?;
    Ok(Json(state.app.service().health()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_status_mapping() {
        let cases = [
            (CoreError::not_found("x"), StatusCode::NOT_FOUND, "not_found"),
            (CoreError::validation("x"), StatusCode::BAD_REQUEST, "validation_error"),
            (
                CoreError::embedding("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "embedding_error",
            ),
            (
                CoreError::config("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
            ),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_anyhow_keeps_core_kind() {
        let err = anyhow::Error::new(CoreError::validation("bad multiplier"));
        let app_err = AppError::from(err.context("setting weight"));
        assert_eq!(app_err.status, StatusCode::BAD_REQUEST);

        let app_err = AppError::from(anyhow::anyhow!("disk full"));
        assert_eq!(app_err.code, "internal");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_408() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("kb")).unwrap();
        let cfg_path = dir.path().join("nancy.toml");
        std::fs::write(&cfg_path, "[corpus]\nroot = \"kb\"\n").unwrap();
        let config = crate::config::load_config(&cfg_path).unwrap();
        let app = Arc::new(App::open(&config).await.unwrap());
        let state = AppState {
            app,
            timeout: Duration::from_millis(10),
        };

        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), CoreError>(())
        };
        let err = with_timeout(&state, "search", slow).await.unwrap_err();
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.code, "timeout");
    }
}
