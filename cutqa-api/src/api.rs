use crate::pipeline::{FileOutcome, Pipeline};
use crate::signature::{self, SIGNATURE_HEADER};
use crate::storage::{Storage, StorageError};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use cutqa::{ScanError, ScanVerdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Largest upload accepted by `/api/scan`
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state handed to every handler
pub struct AppState<S> {
    pub pipeline: Arc<Pipeline<S>>,
    /// App secret used to verify webhook signatures; notifications are
    /// rejected while it is unset.
    pub webhook_secret: Option<Arc<str>>,
}

impl<S> AppState<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>, webhook_secret: Option<&str>) -> Self {
        Self {
            pipeline,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}

// Derived Clone would require S: Clone.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            webhook_secret: self.webhook_secret.clone(),
        }
    }
}

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message describing what went wrong
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub challenge: Option<String>,
}

/// Response for the upload scan endpoint
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    /// File name from the upload, when the client sent one
    pub file: Option<String>,
    #[serde(flatten)]
    pub verdict: ScanVerdict,
}

/// Response for the manual trigger endpoint
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub processed: usize,
    pub outcomes: Vec<FileOutcome>,
}

/// Application-specific error types for the API
#[derive(Error, Debug)]
pub enum AppError {
    /// The uploaded document could not be scanned
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The storage API failed during a pipeline pass
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Scan(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_response = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Build the application router with all routes configured
pub fn app<S: Storage>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(home))
        // Dropbox webhook: verification challenge and change notifications
        .route("/webhook", get(webhook_challenge).post(webhook_notify::<S>))
        // Manual operations
        .route("/api/trigger", post(trigger::<S>))
        .route(
            "/api/scan",
            post(scan_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn home() -> &'static str {
    "Webhook receiver is running!"
}

/// Echoes the verification challenge Dropbox sends when the webhook is registered
pub async fn webhook_challenge(Query(query): Query<ChallengeQuery>) -> Response {
    match query.challenge {
        Some(challenge) => {
            info!(%challenge, "Challenge received");
            (
                [
                    (header::CONTENT_TYPE, "text/plain"),
                    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
                ],
                challenge,
            )
                .into_response()
        }
        None => {
            warn!("No challenge received");
            (StatusCode::BAD_REQUEST, "No challenge received").into_response()
        }
    }
}

/// Accepts a change notification and runs one pipeline pass in the background
pub async fn webhook_notify<S: Storage>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let verified = match (state.webhook_secret.as_deref(), provided) {
        (Some(secret), Some(provided)) => signature::verify(secret.as_bytes(), &body, provided),
        (None, _) => {
            error!("Webhook secret is not configured");
            false
        }
        (_, None) => false,
    };

    if !verified {
        warn!("Invalid webhook signature");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "status": "error",
                "message": "Invalid request signature",
            })),
        )
            .into_response();
    }

    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        match pipeline.run_once().await {
            Ok(outcomes) => info!(files = outcomes.len(), "Webhook pass finished"),
            Err(e) => error!(error = %e, "Webhook pass failed"),
        }
    });

    Json(serde_json::json!({ "status": "accepted" })).into_response()
}

/// Runs one pipeline pass and reports what happened to every candidate file
pub async fn trigger<S: Storage>(
    State(state): State<AppState<S>>,
) -> Result<Json<TriggerResponse>, AppError> {
    let outcomes = state.pipeline.run_once().await?;
    Ok(Json(TriggerResponse {
        processed: outcomes.len(),
        outcomes,
    }))
}

/// Scan an uploaded PDF file
pub async fn scan_upload(mut multipart: Multipart) -> Result<Json<ScanResponse>, AppError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {e}")))?;
            upload = Some((file_name, data));
            break;
        }
    }

    let (file, data) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided in upload".to_string()))?;

    let verdict = tokio::task::spawn_blocking(move || cutqa::scan(&data))
        .await
        .map_err(|e| AppError::Internal(format!("Scan task failed: {e}")))??;

    Ok(Json(ScanResponse { file, verdict }))
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cutqa API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
