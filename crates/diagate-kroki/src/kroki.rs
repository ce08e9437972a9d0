//! Upstream Kroki calls.
//!
//! This module issues one HTTP POST per render and classifies the outcome:
//! - Success: the full response body paired with a content type
//! - [`FetchError::Timeout`]: the global request timeout elapsed
//! - [`FetchError::Network`]: connection, DNS, TLS or body read failures
//! - [`FetchError::Status`]: Kroki answered with a non-success status
//!
//! [`Upstream`] is the seam used by the gateway; [`KrokiClient`] is the real
//! implementation backed by a pooled `ureq` agent.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use ureq::Agent;

use crate::consts::{DEFAULT_TIMEOUT, ERROR_DETAILS_LIMIT, USER_AGENT};
use crate::language::{Engine, Format};

/// One upstream render call.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Normalized Kroki base URL (no trailing slash).
    pub base_url: String,
    pub engine: Engine,
    pub format: Format,
    /// Diagram source, sent verbatim as the request body.
    pub source: String,
}

impl UpstreamRequest {
    /// Target URL: `{base_url}/{endpoint}/{format}`.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.engine.kroki_endpoint(),
            self.format.as_str()
        )
    }
}

/// Rendered diagram body, exactly as Kroki returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Body of a text format (SVG).
    Text(Vec<u8>),
    /// Body of a binary format (PNG, PDF).
    Binary(Vec<u8>),
}

impl Payload {
    /// Raw bytes of the payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(bytes) | Self::Binary(bytes) => bytes,
        }
    }

    /// Text payload decoded as UTF-8, replacing invalid sequences.
    ///
    /// Returns `None` for binary payloads.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(bytes) => Some(String::from_utf8_lossy(bytes)),
            Self::Binary(_) => None,
        }
    }

    /// Payload encoded as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.as_bytes())
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A successful upstream render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Content type declared by Kroki, or the format default.
    pub content_type: String,
    pub payload: Payload,
}

impl Rendered {
    /// Build a render result from a response body.
    #[must_use]
    pub fn from_body(format: Format, content_type: Option<&str>, body: Vec<u8>) -> Self {
        let content_type = content_type
            .filter(|value| !value.is_empty())
            .unwrap_or(format.mime_type())
            .to_owned();
        let payload = if format.is_text() {
            Payload::Text(body)
        } else {
            Payload::Binary(body)
        };
        Self {
            content_type,
            payload,
        }
    }
}

/// Upstream render failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Kroki request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("Kroki request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Kroki returned HTTP {status} for {url}")]
    Status {
        url: String,
        status: u16,
        /// Start of the error body, at most [`ERROR_DETAILS_LIMIT`] characters.
        details: String,
    },
}

impl FetchError {
    /// Upstream URL the failed request targeted.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url, .. } | Self::Network { url, .. } | Self::Status { url, .. } => {
                url
            }
        }
    }
}

/// Something that can render a diagram.
///
/// Implementations block; the gateway runs them on the blocking thread pool.
pub trait Upstream: Send + Sync {
    /// Render `request`, reading the full response into memory.
    fn fetch(&self, request: &UpstreamRequest) -> Result<Rendered, FetchError>;
}

/// Create HTTP agent with the specified timeout.
///
/// The timeout bounds the whole call, body included. Non-success statuses are
/// returned as responses so that their bodies can be read for diagnostics.
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// [`Upstream`] backed by a Kroki HTTP server.
pub struct KrokiClient {
    agent: Agent,
    timeout: Duration,
}

impl Default for KrokiClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl KrokiClient {
    /// Create a client whose calls are bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: create_agent(timeout),
            timeout,
        }
    }

    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, url: &str, error: ureq::Error) -> FetchError {
        match error {
            ureq::Error::Timeout(_) => FetchError::Timeout {
                url: url.to_owned(),
                timeout: self.timeout,
            },
            other => FetchError::Network {
                url: url.to_owned(),
                message: other.to_string(),
            },
        }
    }
}

impl Upstream for KrokiClient {
    fn fetch(&self, request: &UpstreamRequest) -> Result<Rendered, FetchError> {
        let url = request.url();
        let started = Instant::now();

        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Accept", request.format.mime_type())
            .header("User-Agent", USER_AGENT)
            .send(request.source.as_bytes())
            .map_err(|e| self.classify(&url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let mut body = response.into_body();

        if !(200..300).contains(&status) {
            let details = body
                .read_to_vec()
                .map(|bytes| truncate_chars(&String::from_utf8_lossy(&bytes), ERROR_DETAILS_LIMIT))
                .unwrap_or_default();
            return Err(FetchError::Status {
                url,
                status,
                details,
            });
        }

        let bytes = body.read_to_vec().map_err(|e| self.classify(&url, e))?;
        tracing::debug!(
            url = %url,
            status,
            bytes = bytes.len(),
            elapsed_ms = elapsed_ms(started),
            "Kroki responded"
        );

        Ok(Rendered::from_body(
            request.format,
            content_type.as_deref(),
            bytes,
        ))
    }
}

/// Milliseconds since `started`, saturating.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Keep at most `limit` characters of `text`.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_owned(),
        None => text.to_owned(),
    }
}
