//! REST endpoints: job submission and status queries.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::error::JobError;
use crate::pipeline::{EmailSubmission, UploadedFile};

/// Upper bound on files per request, used to size the body limit.
const MAX_FILES_PER_REQUEST: usize = 10;

pub const SERVICE_NAME: &str = "Kanzlei AI Service";

/// Build the Axum router.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .server
        .max_file_size
        .saturating_mul(MAX_FILES_PER_REQUEST);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/akte/create-from-email", post(create_from_email))
        .route("/api/job/{job_id}", get(job_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

// ── Info ────────────────────────────────────────────────────────────────

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "provider": state.pipeline.extractor().active_provider(),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "provider": state.pipeline.extractor().active_provider(),
        "backend_url": state.backend_url,
        "jobs": state.pipeline.tracker().len().await,
    }))
}

// ── Jobs ────────────────────────────────────────────────────────────────

async fn create_from_email(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut email_file: Option<UploadedFile> = None;
    let mut attachments = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Invalid multipart body");
                return detail(e.status(), e.body_text());
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name != "email_file" && name != "attachments" {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().trim().to_string();
        if filename.is_empty() && name == "attachments" {
            continue;
        }
        if !state.server.is_allowed(&filename) {
            return detail(
                StatusCode::BAD_REQUEST,
                format!("Dateityp nicht erlaubt: {filename}"),
            );
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(filename = %filename, error = %e, "Failed to read upload");
                return detail(e.status(), e.body_text());
            }
        };
        if bytes.len() > state.server.max_file_size {
            return detail(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "Datei zu groß: {filename} (maximal {} MB)",
                    state.server.max_file_size / (1024 * 1024)
                ),
            );
        }

        let file = UploadedFile {
            filename,
            content: bytes.to_vec(),
        };
        if name == "email_file" {
            email_file = Some(file);
        } else {
            attachments.push(file);
        }
    }

    let Some(email) = email_file else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "email_file fehlt");
    };

    info!(
        email = %email.filename,
        attachments = attachments.len(),
        "Received email for case creation"
    );

    let submission = EmailSubmission {
        email_filename: email.filename,
        email_bytes: email.content,
        attachments,
    };

    match state.pipeline.submit(submission).await {
        Ok(job_id) => Json(json!({
            "status": "processing",
            "job_id": job_id,
            "message": "E-Mail wird verarbeitet",
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to start pipeline job");
            detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.pipeline.tracker().get_job(&job_id).await {
        Ok(job) => Json(job).into_response(),
        Err(JobError::NotFound { .. }) => detail(StatusCode::NOT_FOUND, "Job not found"),
        Err(e) => detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
