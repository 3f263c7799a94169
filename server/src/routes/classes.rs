//! Class registry listing

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct ClassesResponse {
    pub total: usize,
    pub classes: BTreeMap<usize, String>,
}

/// GET /classes - Index -> flower name table
pub async fn list_classes(State(state): State<SharedState>) -> Json<ClassesResponse> {
    Json(ClassesResponse {
        total: state.classes.total_classes(),
        classes: state.classes.as_map(),
    })
}
