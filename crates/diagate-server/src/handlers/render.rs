//! Render API endpoint.
//!
//! Validates the JSON body, renders through the gateway and returns either a
//! JSON envelope (`svg` text or `base64`) or the raw bytes as an attachment.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use diagate_kroki::{Format, Rendered};
use serde::Serialize;

use crate::app::render_body_limit;
use crate::error::ServerError;
use crate::state::AppState;

/// Inline response for POST /api/render.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineResponse {
    content_type: String,
    /// SVG document text.
    #[serde(skip_serializing_if = "Option::is_none")]
    svg: Option<String>,
    /// Binary payload (PNG, PDF) as standard base64.
    #[serde(skip_serializing_if = "Option::is_none")]
    base64: Option<String>,
}

impl InlineResponse {
    fn from_rendered(rendered: &Rendered) -> Self {
        let (svg, base64) = match rendered.payload.text() {
            Some(text) => (Some(text.into_owned()), None),
            None => (None, Some(rendered.payload.to_base64())),
        };
        Self {
            content_type: rendered.content_type.clone(),
            svg,
            base64,
        }
    }
}

/// Handle POST /api/render.
///
/// The body is taken as raw bytes so malformed JSON maps to `InvalidBody`,
/// and a body over the route's size limit maps to `PayloadTooLarge`.
pub(crate) async fn post_render(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ServerError> {
    let body = body.map_err(|rejection| {
        ServerError::from_body_rejection(
            &rejection,
            render_body_limit(state.gateway.settings().max_code_length),
        )
    })?;
    let (request, outcome) = crate::render_once(&state.gateway, &body).await?;

    tracing::debug!(
        engine = request.engine().as_str(),
        format = request.format().as_str(),
        kroki_url = %outcome.kroki_url,
        outcome = outcome.served.as_str(),
        "Rendered"
    );

    if request.binary() {
        Ok(attachment(&outcome.rendered, request.format()))
    } else {
        Ok((
            [(header::CACHE_CONTROL, "no-store")],
            Json(InlineResponse::from_rendered(&outcome.rendered)),
        )
            .into_response())
    }
}

/// Raw bytes with a download filename matching `format`.
fn attachment(rendered: &Rendered, format: Format) -> Response {
    let disposition = format!("attachment; filename=diagram.{}", format.extension());
    (
        [
            (header::CONTENT_TYPE, rendered.content_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.payload.as_bytes().to_vec(),
    )
        .into_response()
}
