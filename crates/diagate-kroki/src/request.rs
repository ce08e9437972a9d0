//! Inbound render request validation.
//!
//! A [`RenderRequest`] can only be obtained from [`RenderRequest::validate`],
//! which applies the checks in a fixed order (first failure wins):
//!
//! 1. body is a JSON object of the expected shape ([`RequestError::InvalidBody`])
//! 2. `engine`, `format` and `code` are present and non-empty
//!    ([`RequestError::MissingFields`])
//! 3. engine is supported ([`RequestError::UnsupportedEngine`])
//! 4. format is supported ([`RequestError::UnsupportedFormat`])
//! 5. code length is within the limit ([`RequestError::PayloadTooLarge`])
//!
//! Base URL checks need configuration and happen later, in the gateway.

use serde::Deserialize;

use crate::language::{Engine, Format};

/// Inbound JSON body as sent by clients.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRenderRequest {
    engine: Option<String>,
    format: Option<String>,
    code: Option<String>,
    binary: Option<bool>,
    kroki_base_url: Option<String>,
}

/// Request validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Diagram source too large: {length} characters (limit {limit})")]
    PayloadTooLarge { length: usize, limit: usize },
}

impl RequestError {
    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "InvalidBody",
            Self::MissingFields(_) => "MissingFields",
            Self::UnsupportedEngine(_) => "UnsupportedEngine",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
        }
    }
}

/// A validated render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    engine: Engine,
    format: Format,
    code: String,
    binary: bool,
    kroki_base_url: Option<String>,
}

impl RenderRequest {
    /// Parse and validate a JSON request body.
    ///
    /// `max_code_length` is measured in characters and is inclusive.
    pub fn validate(body: &[u8], max_code_length: usize) -> Result<Self, RequestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(RequestError::InvalidBody("empty body".to_owned()));
        }
        let raw: RawRenderRequest =
            serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()))?;

        let engine = non_empty(raw.engine);
        let format = non_empty(raw.format);
        let code = non_empty(raw.code);

        let (Some(engine), Some(format), Some(code)) = (engine.clone(), format.clone(), code.clone())
        else {
            let missing = [("engine", engine), ("format", format), ("code", code)]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| name)
                .collect();
            return Err(RequestError::MissingFields(missing));
        };

        let engine = Engine::parse(&engine).ok_or(RequestError::UnsupportedEngine(engine))?;
        let format = Format::parse(&format).ok_or(RequestError::UnsupportedFormat(format))?;

        let length = code.chars().count();
        if length > max_code_length {
            return Err(RequestError::PayloadTooLarge {
                length,
                limit: max_code_length,
            });
        }

        Ok(Self {
            engine,
            format,
            code,
            binary: raw.binary.unwrap_or(false),
            kroki_base_url: raw
                .kroki_base_url
                .filter(|value| !value.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Diagram source text.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the caller wants raw bytes instead of a JSON envelope.
    #[must_use]
    pub fn binary(&self) -> bool {
        self.binary
    }

    /// Caller-supplied Kroki base URL, if any (not yet validated).
    #[must_use]
    pub fn kroki_base_url(&self) -> Option<&str> {
        self.kroki_base_url.as_deref()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
