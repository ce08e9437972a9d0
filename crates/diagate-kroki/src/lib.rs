//! Kroki render gateway for diagate.
//!
//! This crate sits between HTTP clients and a Kroki server:
//! - Request validation into a [`RenderRequest`]
//! - Base URL normalization and allowlisting for caller-supplied Kroki servers
//! - Content-addressed cache keys (SHA-256 of the source)
//! - Cached, coalesced upstream calls with a bounded timeout
//!
//! # Architecture
//!
//! - [`language`]: `Engine` and `Format`
//! - [`request`]: inbound body validation
//! - [`base_url`]: `BaseUrlPolicy` and normalization
//! - [`cache`]: `DiagramKey`
//! - [`kroki`]: the `Upstream` seam and the `ureq`-backed `KrokiClient`
//! - [`gateway`]: `Gateway`, tying everything to the result cache and coalescer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use diagate_kroki::{Gateway, GatewaySettings, KrokiClient, RenderRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = GatewaySettings::default();
//! let gateway = Gateway::new(settings, Arc::new(KrokiClient::default()));
//!
//! let body = br#"{"engine":"mermaid","format":"svg","code":"flowchart TD\nA-->B"}"#;
//! let request = RenderRequest::validate(body, gateway.settings().max_code_length)?;
//! let outcome = gateway.render(&request).await?;
//! println!("{}", outcome.rendered.content_type);
//! # Ok(())
//! # }
//! ```

pub mod base_url;
pub mod cache;
mod consts;
pub mod gateway;
pub mod kroki;
pub mod language;
pub mod request;

pub use base_url::{BaseUrlError, BaseUrlPolicy, normalize_base_url, parse_allowlist};
pub use cache::DiagramKey;
pub use consts::{DEFAULT_KROKI_URL, DEFAULT_MAX_CODE_LENGTH, DEFAULT_TIMEOUT, USER_AGENT};
pub use diagate_cache::CacheSettings;
pub use gateway::{Gateway, GatewayError, GatewaySettings, RenderOutcome, Served, timeout_ms};
pub use kroki::{FetchError, KrokiClient, Payload, Rendered, Upstream, UpstreamRequest};
pub use language::{Engine, Format};
pub use request::{RenderRequest, RequestError};
