//! Error types for the HTTP server.
//!
//! Every failure is rendered as `{"error", "code", ...details}` with a status
//! derived from its class: caller input (400, 413), misconfiguration or
//! internal faults (500), upstream failures (502) and upstream timeouts (504).

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diagate_kroki::{FetchError, GatewayError, RequestError, timeout_ms};
use serde_json::{Value, json};

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Request body failed validation.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Base URL resolution or upstream render failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Request body exceeded the route's byte limit before it could be parsed.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl ServerError {
    /// Map a failure to read the request body.
    ///
    /// `limit` is the body limit in bytes that applies to the route.
    #[must_use]
    pub fn from_body_rejection(rejection: &BytesRejection, limit: usize) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::BodyTooLarge { limit }
        } else {
            Self::Request(RequestError::InvalidBody(rejection.body_text()))
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Request(e) => e.code(),
            Self::Gateway(e) => e.code(),
            Self::BodyTooLarge { .. } => "PayloadTooLarge",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request(RequestError::PayloadTooLarge { .. }) | Self::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Request(_)
            | Self::Gateway(
                GatewayError::InvalidBaseUrl { .. } | GatewayError::BaseUrlNotAllowed { .. },
            ) => StatusCode::BAD_REQUEST,
            Self::Gateway(GatewayError::InvalidConfig(_) | GatewayError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Gateway(GatewayError::Fetch(FetchError::Timeout { .. })) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Gateway(GatewayError::Fetch(_)) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body: human message, code and per-class details.
    fn body(&self) -> Value {
        let code = self.code();
        match self {
            Self::Request(RequestError::PayloadTooLarge { length, limit }) => json!({
                "error": self.to_string(),
                "code": code,
                "length": length,
                "limit": limit,
            }),
            Self::Request(e) => json!({"error": e.to_string(), "code": code}),
            Self::BodyTooLarge { limit } => json!({
                "error": self.to_string(),
                "code": code,
                "maxBodyBytes": limit,
            }),
            Self::Gateway(GatewayError::InvalidConfig(_)) => json!({
                "error": "Kroki base URL is misconfigured",
                "code": code,
            }),
            Self::Gateway(GatewayError::InvalidBaseUrl { value, .. }) => json!({
                "error": self.to_string(),
                "code": code,
                "krokiBaseUrl": value,
            }),
            Self::Gateway(GatewayError::BaseUrlNotAllowed { value }) => json!({
                "error": self.to_string(),
                "code": code,
                "krokiBaseUrl": value,
            }),
            Self::Gateway(GatewayError::Fetch(FetchError::Status {
                url,
                status,
                details,
            })) => json!({
                "error": "Kroki render error",
                "code": code,
                "status": status,
                "krokiUrl": url,
                "details": details,
            }),
            Self::Gateway(GatewayError::Fetch(FetchError::Timeout { url, timeout })) => json!({
                "error": "Kroki request timed out",
                "code": code,
                "krokiUrl": url,
                "timeoutMs": timeout_ms(*timeout),
            }),
            Self::Gateway(GatewayError::Fetch(FetchError::Network { url, message })) => json!({
                "error": "Kroki request failed",
                "code": code,
                "krokiUrl": url,
                "message": message,
            }),
            Self::Gateway(GatewayError::Internal(_)) => json!({
                "error": "Server error",
                "code": code,
            }),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            Self::Gateway(GatewayError::InvalidConfig(e)) => {
                tracing::error!(error = %e, "Default Kroki base URL is invalid");
            }
            Self::Gateway(GatewayError::Internal(e)) => {
                tracing::error!(error = %e, "Render task failed");
            }
            _ => tracing::debug!(code = self.code(), error = %self, "Render rejected"),
        }

        (self.status(), axum::Json(self.body())).into_response()
    }
}
