//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Response for GET /api/healthz.
#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: String,
}

/// Handle GET /api/healthz.
pub(crate) async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
    })
}
