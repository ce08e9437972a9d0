//! Render orchestration.
//!
//! [`Gateway::render`] takes a validated [`RenderRequest`] through base URL
//! resolution, key derivation, the result cache and the request coalescer.
//! Only a cache miss with no matching flight reaches the upstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use diagate_cache::{CacheSettings, Coalescer, Flight, ResultCache};
use tokio::task::JoinError;

use crate::base_url::{BaseUrlError, BaseUrlPolicy};
use crate::cache::DiagramKey;
use crate::consts::{DEFAULT_KROKI_URL, DEFAULT_MAX_CODE_LENGTH};
use crate::kroki::{FetchError, Rendered, Upstream, UpstreamRequest, elapsed_ms};
use crate::request::RenderRequest;

/// Failure after request validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The configured default base URL is unusable.
    #[error("Kroki base URL is misconfigured: {0}")]
    InvalidConfig(BaseUrlError),

    #[error("Invalid Kroki base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: BaseUrlError },

    #[error("Kroki base URL is not allowed: {value}")]
    BaseUrlNotAllowed { value: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The upstream task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidKrokiConfig",
            Self::InvalidBaseUrl { .. } => "InvalidKrokiBaseUrl",
            Self::BaseUrlNotAllowed { .. } => "KrokiBaseUrlNotAllowed",
            Self::Fetch(FetchError::Timeout { .. }) => "KrokiTimeout",
            Self::Fetch(FetchError::Network { .. }) => "KrokiNetworkError",
            Self::Fetch(FetchError::Status { .. }) => "KrokiError",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl From<JoinError> for GatewayError {
    fn from(err: JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Default Kroki base URL, normalized on use.
    pub kroki_base_url: String,
    /// Accept any well-formed caller-supplied base URL.
    pub allow_any_base_url: bool,
    /// Comma or whitespace separated caller-supplied base URLs to accept.
    pub allowed_base_urls: String,
    /// Maximum diagram source length in characters.
    pub max_code_length: usize,
    pub cache: CacheSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            kroki_base_url: DEFAULT_KROKI_URL.to_owned(),
            allow_any_base_url: false,
            allowed_base_urls: String::new(),
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            cache: CacheSettings::default(),
        }
    }
}

/// Where a successful render came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// Result cache hit.
    Cache,
    /// This request called the upstream.
    Upstream,
    /// Joined a concurrent identical request's upstream call.
    Shared,
}

impl Served {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Upstream => "upstream",
            Self::Shared => "shared",
        }
    }
}

/// A successful render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub rendered: Arc<Rendered>,
    /// Upstream URL for this request (also set on cache hits).
    pub kroki_url: String,
    pub served: Served,
}

/// Caching, coalescing front for an [`Upstream`].
pub struct Gateway {
    settings: GatewaySettings,
    policy: BaseUrlPolicy,
    cache: Arc<ResultCache<Arc<Rendered>>>,
    flights: Coalescer<Arc<Rendered>, GatewayError>,
    upstream: Arc<dyn Upstream>,
}

impl Gateway {
    #[must_use]
    pub fn new(settings: GatewaySettings, upstream: Arc<dyn Upstream>) -> Self {
        let policy = BaseUrlPolicy::new(
            &settings.kroki_base_url,
            settings.allow_any_base_url,
            &settings.allowed_base_urls,
        );
        Self {
            cache: Arc::new(ResultCache::new(settings.cache)),
            flights: Coalescer::new(),
            policy,
            settings,
            upstream,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Base URL resolution policy built from the settings.
    #[must_use]
    pub fn policy(&self) -> &BaseUrlPolicy {
        &self.policy
    }

    /// Number of cached entries, expired ones included until pruned.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Render a validated request.
    ///
    /// Failures are never cached: the next identical request calls the
    /// upstream again.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, GatewayError> {
        let base_url = self.policy.resolve(request.kroki_base_url())?;
        let upstream_request = UpstreamRequest {
            base_url,
            engine: request.engine(),
            format: request.format(),
            source: request.code().to_owned(),
        };
        let kroki_url = upstream_request.url();
        let key = DiagramKey {
            base_url: &upstream_request.base_url,
            engine: upstream_request.engine,
            format: upstream_request.format,
            source: &upstream_request.source,
        }
        .cache_key();

        if let Some(rendered) = self.cache.lookup(&key, Instant::now()) {
            tracing::debug!(kroki_url = %kroki_url, "Render cache hit");
            return Ok(RenderOutcome {
                rendered,
                kroki_url,
                served: Served::Cache,
            });
        }

        let producer = fetch_and_store(
            Arc::clone(&self.upstream),
            Arc::clone(&self.cache),
            key.clone(),
            upstream_request,
        );
        let (result, flight) = self.flights.run(&key, producer).await;
        let served = match flight {
            Flight::Started => Served::Upstream,
            Flight::Joined => Served::Shared,
        };

        result.map(|rendered| RenderOutcome {
            rendered,
            kroki_url,
            served,
        })
    }
}

/// Call the upstream on the blocking pool and cache a success.
///
/// The cache is written before the flight deregisters, so a request arriving
/// in between finds the entry.
async fn fetch_and_store(
    upstream: Arc<dyn Upstream>,
    cache: Arc<ResultCache<Arc<Rendered>>>,
    key: String,
    request: UpstreamRequest,
) -> Result<Arc<Rendered>, GatewayError> {
    let started = Instant::now();
    let url = request.url();
    let fetched = tokio::task::spawn_blocking(move || upstream.fetch(&request)).await?;

    match fetched {
        Ok(rendered) => {
            let rendered = Arc::new(rendered);
            cache.put(&key, Arc::clone(&rendered), Instant::now());
            tracing::debug!(
                kroki_url = %url,
                bytes = rendered.payload.len(),
                elapsed_ms = elapsed_ms(started),
                "Rendered diagram"
            );
            Ok(rendered)
        }
        Err(e) => {
            tracing::warn!(
                kroki_url = %url,
                elapsed_ms = elapsed_ms(started),
                error = %e,
                "Kroki render failed"
            );
            Err(e.into())
        }
    }
}

/// Timeout reported for [`FetchError::Timeout`], in whole milliseconds.
#[must_use]
pub fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::kroki::Payload;
    use crate::language::Format;
    use pretty_assertions::assert_eq;

    /// Upstream double that counts calls and optionally stalls or fails.
    struct MockUpstream {
        calls: AtomicUsize,
        delay: Duration,
        fail_first: usize,
    }

    impl MockUpstream {
        fn new() -> Arc<Self> {
            Self::with(Duration::ZERO, 0)
        }

        fn with(delay: Duration, fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail_first,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Upstream for MockUpstream {
        fn fetch(&self, request: &UpstreamRequest) -> Result<Rendered, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if n < self.fail_first {
                return Err(FetchError::Timeout {
                    url: request.url(),
                    timeout: Duration::from_secs(10),
                });
            }
            let body = format!("<svg>{}</svg>", request.source);
            Ok(Rendered::from_body(request.format, None, body.into_bytes()))
        }
    }

    fn gateway(upstream: Arc<MockUpstream>, settings: GatewaySettings) -> Gateway {
        Gateway::new(settings, upstream)
    }

    fn request(body: &str) -> RenderRequest {
        RenderRequest::validate(body.as_bytes(), DEFAULT_MAX_CODE_LENGTH).unwrap()
    }

    const MERMAID: &str = r#"{"engine":"mermaid","format":"svg","code":"flowchart TD\nA-->B"}"#;

    #[tokio::test]
    async fn test_second_identical_request_hits_cache() {
        let upstream = MockUpstream::new();
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());

        let first = gateway.render(&request(MERMAID)).await.unwrap();
        let second = gateway.render(&request(MERMAID)).await.unwrap();

        assert_eq!(upstream.calls(), 1);
        assert_eq!(first.served, Served::Upstream);
        assert_eq!(second.served, Served::Cache);
        assert_eq!(first.kroki_url, "https://kroki.io/mermaid/svg");
        assert_eq!(second.rendered, first.rendered);
        assert_eq!(
            second.rendered.payload,
            Payload::Text(b"<svg>flowchart TD\nA-->B</svg>".to_vec())
        );
        assert_eq!(second.rendered.content_type, Format::Svg.mime_type());
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_call() {
        let upstream = MockUpstream::with(Duration::from_millis(100), 0);
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());
        let req = request(MERMAID);

        let (a, b) = tokio::join!(gateway.render(&req), gateway.render(&req));

        assert_eq!(upstream.calls(), 1);
        let mut served = [a.unwrap().served, b.unwrap().served];
        served.sort_by_key(|s| s.as_str());
        assert_eq!(served, [Served::Shared, Served::Upstream]);
    }

    #[tokio::test]
    async fn test_different_formats_are_separate_calls() {
        let upstream = MockUpstream::new();
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());

        gateway.render(&request(MERMAID)).await.unwrap();
        let png = gateway
            .render(&request(r#"{"engine":"mermaid","format":"png","code":"flowchart TD\nA-->B"}"#))
            .await
            .unwrap();

        assert_eq!(upstream.calls(), 2);
        assert!(matches!(png.rendered.payload, Payload::Binary(_)));
    }

    #[tokio::test]
    async fn test_flowchart_alias_uses_mermaid_endpoint_with_own_key() {
        let upstream = MockUpstream::new();
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());

        gateway.render(&request(MERMAID)).await.unwrap();
        let flowchart = gateway
            .render(&request(r#"{"engine":"flowchart","format":"svg","code":"flowchart TD\nA-->B"}"#))
            .await
            .unwrap();

        assert_eq!(flowchart.kroki_url, "https://kroki.io/mermaid/svg");
        assert_eq!(flowchart.served, Served::Upstream);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let upstream = MockUpstream::new();
        let settings = GatewaySettings {
            cache: CacheSettings {
                ttl: Duration::from_millis(50),
                ..CacheSettings::default()
            },
            ..GatewaySettings::default()
        };
        let gateway = gateway(Arc::clone(&upstream), settings);

        gateway.render(&request(MERMAID)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let again = gateway.render(&request(MERMAID)).await.unwrap();

        assert_eq!(again.served, Served::Upstream);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_huge_ttl_still_caches() {
        let upstream = MockUpstream::new();
        let settings = GatewaySettings {
            cache: CacheSettings {
                ttl: Duration::from_secs(u64::MAX),
                ..CacheSettings::default()
            },
            ..GatewaySettings::default()
        };
        let gateway = gateway(Arc::clone(&upstream), settings);

        let first = gateway.render(&request(MERMAID)).await.unwrap();
        let second = gateway.render(&request(MERMAID)).await.unwrap();

        assert_eq!(first.served, Served::Upstream);
        assert_eq!(second.served, Served::Cache);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let upstream = MockUpstream::with(Duration::ZERO, 1);
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());

        let err = gateway.render(&request(MERMAID)).await.unwrap_err();
        assert_eq!(err.code(), "KrokiTimeout");
        assert_eq!(gateway.cached_entries(), 0);

        let ok = gateway.render(&request(MERMAID)).await.unwrap();
        assert_eq!(ok.served, Served::Upstream);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let upstream = MockUpstream::with(Duration::from_millis(100), 1);
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());
        let req = request(MERMAID);

        let (a, b) = tokio::join!(gateway.render(&req), gateway.render(&req));

        assert_eq!(upstream.calls(), 1);
        assert_eq!(a.unwrap_err().code(), "KrokiTimeout");
        assert_eq!(b.unwrap_err().code(), "KrokiTimeout");
    }

    #[tokio::test]
    async fn test_disallowed_base_never_reaches_upstream() {
        let upstream = MockUpstream::new();
        let gateway = gateway(Arc::clone(&upstream), GatewaySettings::default());

        let err = gateway
            .render(&request(
                r#"{"engine":"mermaid","format":"svg","code":"x","krokiBaseUrl":"https://evil.example.com"}"#,
            ))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "KrokiBaseUrlNotAllowed");
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_allowlisted_base_is_used_and_keyed_separately() {
        let upstream = MockUpstream::new();
        let settings = GatewaySettings {
            allowed_base_urls: "https://kroki.example.com".to_owned(),
            ..GatewaySettings::default()
        };
        let gateway = gateway(Arc::clone(&upstream), settings);

        gateway.render(&request(MERMAID)).await.unwrap();
        let custom = gateway
            .render(&request(
                r#"{"engine":"mermaid","format":"svg","code":"flowchart TD\nA-->B","krokiBaseUrl":"https://KROKI.example.com/"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(custom.kroki_url, "https://kroki.example.com/mermaid/svg");
        assert_eq!(custom.served, Served::Upstream);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_default_is_config_error() {
        let upstream = MockUpstream::new();
        let settings = GatewaySettings {
            kroki_base_url: "ftp://kroki.io".to_owned(),
            ..GatewaySettings::default()
        };
        let gateway = gateway(Arc::clone(&upstream), settings);

        let err = gateway.render(&request(MERMAID)).await.unwrap_err();

        assert_eq!(err.code(), "InvalidKrokiConfig");
        assert_eq!(upstream.calls(), 0);
    }

    #[test]
    fn test_error_codes() {
        let url = "https://kroki.io/mermaid/svg".to_owned();
        let network = GatewayError::from(FetchError::Network {
            url: url.clone(),
            message: "connection refused".to_owned(),
        });
        let status = GatewayError::from(FetchError::Status {
            url,
            status: 400,
            details: "Syntax error".to_owned(),
        });

        assert_eq!(network.code(), "KrokiNetworkError");
        assert_eq!(status.code(), "KrokiError");
        assert_eq!(GatewayError::Internal("boom".to_owned()).code(), "InternalError");
    }

    #[test]
    fn test_timeout_ms() {
        assert_eq!(timeout_ms(Duration::from_secs(10)), 10_000);
    }
}
