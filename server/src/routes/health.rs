//! Status and health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub message: String,
    pub version: String,
    pub model_loaded: bool,
    pub model_status: String,
    pub total_classes: usize,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// GET / - Service status
pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "HSSAN Flower Classification API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model.is_ready(),
        model_status: state.model.status().to_string(),
        total_classes: state.classes.total_classes(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// GET /health - Liveness check
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.model.is_ready(),
    })
}
