//! Web form for single-file documentation.
//!
//! `GET /` serves the upload page, `POST /document` runs the file documenter
//! on an uploaded file, `POST /feedback` attaches reviewer notes to the usage
//! log and `GET /health` reports liveness.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::ProviderConfig;
use crate::core::llm::LlmProvider;
use crate::core::{FileDocumenter, OperationKind, UsageLedger, UsageLog, UsageRecord};
use crate::error::{DocscribeError, Result};

const INDEX_HTML: &str = include_str!("static/index.html");

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared server state. Only the usage log is mutable.
pub struct AppState {
    provider: Box<dyn LlmProvider>,
    pricing: ProviderConfig,
    documenter: FileDocumenter,
    usage: Mutex<UsageLog>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        pricing: ProviderConfig,
        documenter: FileDocumenter,
        usage: UsageLog,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            provider,
            pricing,
            documenter,
            usage: Mutex::new(usage),
            max_upload_bytes,
        }
    }
}

/// JSON `{ "error": ... }` response with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<DocscribeError> for ApiError {
    fn from(err: DocscribeError) -> Self {
        let status = match &err {
            DocscribeError::UnsupportedFile(_) => StatusCode::BAD_REQUEST,
            DocscribeError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DocscribeError::Provider { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}", self.message);
        } else {
            warn!("{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DocumentResponse {
    pub documented_code: String,
    pub token_count: u64,
    pub original_code: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub source_file: String,
    pub feedback: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(
            "/document",
            post(document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/feedback", post(feedback))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "ok"
}

async fn document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> std::result::Result<Json<DocumentResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Multipart error: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Failed to read file: {e}")))?;

        return document_upload(&state, &file_name, &bytes).await.map(Json);
    }

    Err(ApiError::new(StatusCode::BAD_REQUEST, "No file provided"))
}

/// Validate and document one uploaded file, then log its usage
async fn document_upload(
    state: &AppState,
    file_name: &str,
    bytes: &[u8],
) -> std::result::Result<DocumentResponse, ApiError> {
    if bytes.len() > state.max_upload_bytes {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "{} is {} bytes, the limit is {} bytes",
                file_name,
                bytes.len(),
                state.max_upload_bytes
            ),
        ));
    }

    state.documenter.check_file_name(file_name)?;
    let code = std::str::from_utf8(bytes).map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, format!("{} is not valid UTF-8 text", file_name))
    })?;

    info!("Received {} ({} bytes)", file_name, bytes.len());
    let mut ledger = UsageLedger::new();
    let doc = state
        .documenter
        .document(file_name, code, state.provider.as_ref(), &state.pricing, &mut ledger)
        .await?;

    let record = UsageRecord::new(
        file_name,
        OperationKind::FileDoc,
        code,
        doc.token_count,
        doc.estimated_cost,
    );
    if let Err(e) = state.usage.lock().await.log_operation(&record) {
        warn!("Failed to record usage for {}: {}", file_name, e);
    }

    Ok(DocumentResponse {
        documented_code: doc.documented_code,
        token_count: doc.token_count,
        original_code: doc.original_code,
    })
}

async fn feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let found = state
        .usage
        .lock()
        .await
        .attach_feedback(&request.source_file, &request.feedback)?;

    if !found {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("No documented file named {}", request.source_file),
        ));
    }

    info!("Feedback recorded for {}", request.source_file);
    Ok(Json(json!({ "status": "ok" })))
}
