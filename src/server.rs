//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents` | Upload `{filename, content_base64}` |
//! | `GET` | `/documents` | List documents |
//! | `GET` | `/documents/stats` | Index and registry counts |
//! | `GET` | `/documents/{id}` | One document |
//! | `DELETE` | `/documents/{id}` | Delete one document |
//! | `DELETE` | `/documents` | Delete every document |
//! | `POST` | `/prompts/optimize` | Run the optimization loop |
//! | `POST` | `/prompts/analyze` | Analyze a template |
//! | `POST` | `/prompts/export` | OpenAI JSON and readable transcript of a prompt |
//! | `POST` | `/prompts/test` | Generate an answer for a prompt |
//! | `GET` | `/config/llm` | Current model settings (no key) |
//! | `POST` | `/config/llm` | Partial update of model settings |
//! | `POST` | `/config/test-connection` | Round-trip a tiny chat request |
//! | `GET` | `/config/optimization` | Loop and chunking settings |
//! | `GET` | `/health` | Liveness and version |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "..." } }
//! ```
//!
//! | Error | Status |
//! |-------|--------|
//! | validation, configuration | 400 |
//! | not found | 404 |
//! | provider | 502 |
//! | storage | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use prompt_studio_core::models::{ChatPrompt, Document, ExpectedOutput, OptimizationResult, TemplateAnalysis};
use prompt_studio_core::prompt::ExportedPrompt;
use prompt_studio_core::StudioError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::llm::ConnectionReport;
use crate::settings::{LlmSettingsView, LlmUpdate};
use crate::studio::{OptimizationView, Studio, StudioStats};

#[derive(Clone)]
struct AppState {
    studio: Arc<Studio>,
}

/// Open the studio and serve on `[server].bind` until the process exits.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let studio = Arc::new(Studio::open(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");
    serve(studio, listener).await
}

/// Serve `studio` on an already-bound listener.
pub async fn serve(studio: Arc<Studio>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(studio)).await?;
    Ok(())
}

pub fn router(studio: Arc<Studio>) -> Router {
    // base64 inflates uploads by 4/3; leave room for the JSON envelope.
    let body_limit = (studio.config().uploads.max_bytes() as usize / 3 + 1) * 4 + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/documents",
            post(handle_upload).get(handle_list).delete(handle_clear),
        )
        .route("/documents/stats", get(handle_stats))
        .route(
            "/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/prompts/optimize", post(handle_optimize))
        .route("/prompts/analyze", post(handle_analyze))
        .route("/prompts/export", post(handle_export))
        .route("/prompts/test", post(handle_test_prompt))
        .route("/config/llm", get(handle_get_llm).post(handle_update_llm))
        .route("/config/test-connection", post(handle_test_connection))
        .route("/config/optimization", get(handle_get_optimization))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState { studio })
}

// ============ Error response ============

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

struct AppError(StudioError);

impl From<StudioError> for AppError {
    fn from(err: StudioError) -> Self {
        AppError(err)
    }
}

pub fn status_for(err: &StudioError) -> StatusCode {
    match err {
        StudioError::Validation(_) | StudioError::Configuration(_) => StatusCode::BAD_REQUEST,
        StudioError::NotFound(_) => StatusCode::NOT_FOUND,
        StudioError::Provider { .. } => StatusCode::BAD_GATEWAY,
        StudioError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

/// `Json` request body whose rejections use the error envelope.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError(StudioError::Validation(format!(
                "invalid request body: {}",
                rejection.body_text()
            )))),
        }
    }
}

// ============ Documents ============

#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    content_base64: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UploadRequest>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.trim())
        .map_err(|e| StudioError::Validation(format!("content_base64 is not valid base64: {}", e)))?;
    let doc = state.studio.ingest(&req.filename, &bytes).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Serialize)]
struct DocumentList {
    documents: Vec<Document>,
    total: usize,
}

async fn handle_list(State(state): State<AppState>) -> ApiResult<DocumentList> {
    let documents = state.studio.list_documents().await?;
    Ok(Json(DocumentList {
        total: documents.len(),
        documents,
    }))
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<StudioStats> {
    Ok(Json(state.studio.stats().await?))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    Ok(Json(state.studio.get_document(&id).await?))
}

#[derive(Serialize)]
struct DeleteResponse {
    id: String,
    chunks_removed: usize,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    let chunks_removed = state.studio.delete_document(&id).await?;
    Ok(Json(DeleteResponse { id, chunks_removed }))
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: u64,
}

async fn handle_clear(State(state): State<AppState>) -> ApiResult<ClearResponse> {
    let cleared = state.studio.clear_documents().await?;
    Ok(Json(ClearResponse { cleared }))
}

// ============ Prompts ============

#[derive(Deserialize)]
struct OptimizeRequest {
    expected_output: ExpectedOutput,
    /// Empty means every document.
    #[serde(default)]
    document_ids: Vec<String>,
}

async fn handle_optimize(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<OptimizeRequest>,
) -> ApiResult<OptimizationResult> {
    let filter = (!req.document_ids.is_empty()).then_some(req.document_ids.as_slice());
    Ok(Json(
        state.studio.optimize(&req.expected_output, filter).await?,
    ))
}

async fn handle_analyze(
    State(state): State<AppState>,
    JsonBody(expected): JsonBody<ExpectedOutput>,
) -> ApiResult<TemplateAnalysis> {
    Ok(Json(state.studio.analyze(&expected)?))
}

#[derive(Deserialize)]
struct PromptRequest {
    prompt: ChatPrompt,
}

#[derive(Serialize)]
struct ExportResponse {
    openai_format: ExportedPrompt,
    readable: String,
}

async fn handle_export(JsonBody(req): JsonBody<PromptRequest>) -> ApiResult<ExportResponse> {
    Ok(Json(ExportResponse {
        openai_format: req.prompt.to_export(),
        readable: req.prompt.render_transcript(),
    }))
}

#[derive(Serialize)]
struct TestPromptResponse {
    output: String,
}

async fn handle_test_prompt(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PromptRequest>,
) -> ApiResult<TestPromptResponse> {
    let output = state.studio.test_prompt(&req.prompt).await?;
    Ok(Json(TestPromptResponse { output }))
}

// ============ Config ============

async fn handle_get_llm(State(state): State<AppState>) -> Json<LlmSettingsView> {
    Json(state.studio.llm_settings())
}

async fn handle_update_llm(
    State(state): State<AppState>,
    JsonBody(update): JsonBody<LlmUpdate>,
) -> ApiResult<LlmSettingsView> {
    Ok(Json(state.studio.update_llm_settings(update)?))
}

async fn handle_test_connection(State(state): State<AppState>) -> ApiResult<ConnectionReport> {
    Ok(Json(state.studio.test_connection().await?))
}

async fn handle_get_optimization(State(state): State<AppState>) -> Json<OptimizationView> {
    Json(state.studio.optimization_settings())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
