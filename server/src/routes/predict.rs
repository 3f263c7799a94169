//! Prediction endpoint

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use hssan::{HssanError, PredictionResult};
use serde::Serialize;
use tracing::{error, warn};

use crate::state::SharedState;

/// Multipart field carrying the uploaded image
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predictions: Vec<PredictionResult>,
}

/// Map a library failure to an HTTP status
fn error_response(err: HssanError) -> (StatusCode, String) {
    if err.is_client_fault() {
        warn!("Rejected upload: {}", err);
        return (StatusCode::BAD_REQUEST, err.to_string());
    }

    match err {
        HssanError::ModelNotReady => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => {
            error!("Prediction failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn is_image(field: &Field<'_>) -> bool {
    field
        .content_type()
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(false)
}

/// Pull the bytes of the `file` field out of the upload
async fn read_image(multipart: &mut Multipart) -> Result<Vec<u8>, (StatusCode, String)> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        (StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        if !is_image(&field) {
            return Err((StatusCode::BAD_REQUEST, "File must be an image".to_string()));
        }
        return Ok(field.bytes().await.map_err(bad_request)?.to_vec());
    }

    Err((
        StatusCode::BAD_REQUEST,
        format!("Missing '{}' field", FILE_FIELD),
    ))
}

/// POST /predict - Classify an uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    if !state.model.is_ready() {
        return Err(error_response(HssanError::ModelNotReady));
    }

    let bytes = read_image(&mut multipart).await?;

    let permit = state.workers.clone().acquire_owned().await.map_err(|e| {
        error!("Worker pool closed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Worker pool unavailable".to_string())
    })?;

    let worker = state.clone();
    let predictions = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        worker
            .engine
            .classify(&worker.model, &worker.classes, &bytes)
    })
    .await
    .map_err(|e| {
        error!("Prediction task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Prediction task failed".to_string())
    })?
    .map_err(error_response)?;

    Ok(Json(PredictResponse {
        success: true,
        predictions,
    }))
}
