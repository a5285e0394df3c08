use crate::{error::ApiError, state::AppState, uploads::StagedUpload};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
};
use inference::{BatchReport, SingleReport};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const SINGLE_FIELD: &str = "image";
const BATCH_FIELD: &str = "images";

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/detect", post(detect))
        .route("/detect-batch", post(detect_batch))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_path: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.model.loaded,
        model_path: state.model.path.clone(),
    })
}

/// POST /detect - one file in the `image` field
async fn detect(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SingleReport>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(SINGLE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    let staged = state
        .uploads
        .stage(&filename, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to stage upload: {}", e)))?;

    let report = state.detector.detect_single(staged).await?;
    tracing::info!(
        has_subject = report.has_subject,
        detections = report.detections.len(),
        "Single detection complete"
    );
    Ok(Json(report))
}

/// POST /detect-batch - any number of files in the `images` field
async fn detect_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, ApiError> {
    let mut staged: Vec<StagedUpload> = Vec::new();

    // Anything already staged is removed if a later part fails
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(BATCH_FIELD) {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                tracing::debug!("Skipping batch part without a filename");
                continue;
            }
        };
        let bytes = field.bytes().await?;
        let upload = state
            .uploads
            .stage(&filename, &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to stage upload: {}", e)))?;
        staged.push(upload);
    }

    if staged.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    let count = staged.len();
    let report = state.detector.detect_batch(staged).await?;
    tracing::info!(
        images = count,
        subjects_found = report.subjects_found,
        errors = report.error_count(),
        "Batch detection complete"
    );
    Ok(Json(report))
}
