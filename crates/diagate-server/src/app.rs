//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::security;
use crate::state::AppState;

/// Worst-case JSON bytes per source character: a surrogate pair escaped as
/// two `\uXXXX` sequences.
const JSON_BYTES_PER_CHAR: usize = 12;

/// Room for the fields around `code`.
const BODY_OVERHEAD: usize = 64 * 1024;

/// Largest render request body accepted for a given code length limit.
///
/// Any body whose `code` fits `max_code_length` fits this limit, so oversized
/// code is reported by validation with its character count.
pub(crate) fn render_body_limit(max_code_length: usize) -> usize {
    max_code_length
        .saturating_mul(JSON_BYTES_PER_CHAR)
        .saturating_add(BODY_OVERHEAD)
}

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = render_body_limit(state.gateway.settings().max_code_length);

    Router::new()
        .route(
            "/api/render",
            post(handlers::render::post_render).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/healthz", get(handlers::health::get_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security::content_type_options_layer())
                .layer(security::frame_options_layer()),
        )
        .with_state(state)
}
