//! HTTP server for the diagate Kroki render gateway.
//!
//! This crate provides an axum server exposing:
//! - `POST /api/render`: render a diagram through the caching gateway
//! - `GET /api/healthz`: liveness check
//!
//! # Quick Start
//!
//! ```no_run
//! use diagate_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         port: 8080,
//!         version: "1.0.0".to_owned(),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Client ──HTTP──► axum router (diagate-server)
//!                      │
//!                      └─► Gateway (diagate-kroki)
//!                              │
//!                              ├─► ResultCache / Coalescer (diagate-cache)
//!                              │
//!                              └─► KrokiClient ──HTTP──► Kroki
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use diagate_kroki::{
    CacheSettings, DEFAULT_TIMEOUT, Gateway, GatewaySettings, KrokiClient, RenderOutcome,
    RenderRequest, Upstream,
};

pub use app::create_router;
pub use error::ServerError;
pub use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Gateway settings (base URL policy, cache, limits).
    pub gateway: GatewaySettings,
    /// Upstream request timeout.
    pub kroki_timeout: Duration,
    /// Application version reported by the health check.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            gateway: GatewaySettings::default(),
            kroki_timeout: DEFAULT_TIMEOUT,
            version: String::new(),
        }
    }
}

impl ServerConfig {
    /// Build a gateway backed by a real Kroki client.
    ///
    /// Logs an error if the default base URL is unusable; renders then fail
    /// with `InvalidKrokiConfig` until it is fixed.
    #[must_use]
    pub fn build_gateway(&self) -> Gateway {
        let upstream: Arc<dyn Upstream> = Arc::new(KrokiClient::new(self.kroki_timeout));
        let gateway = Gateway::new(self.gateway.clone(), upstream);

        match gateway.policy().default_base_url() {
            Ok(base) => tracing::info!(
                kroki_url = base,
                allow_any = gateway.policy().allows_any(),
                allowlist = gateway.policy().allowlist().len(),
                "Kroki upstream configured"
            ),
            Err(e) => tracing::error!(
                kroki_url = %self.gateway.kroki_base_url,
                error = %e,
                "Default Kroki base URL is invalid; renders will fail"
            ),
        }
        gateway
    }
}

/// Run the server.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config.build_gateway(), config.version.clone()));
    let app = create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Render one request body through `gateway`, outside of HTTP.
///
/// # Errors
///
/// Returns the same errors the render endpoint would report.
pub async fn render_once(
    gateway: &Gateway,
    body: &[u8],
) -> Result<(RenderRequest, RenderOutcome), ServerError> {
    let request = RenderRequest::validate(body, gateway.settings().max_code_length)?;
    let outcome = gateway.render(&request).await?;
    Ok((request, outcome))
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from diagate config.
///
/// # Arguments
///
/// * `config` - diagate configuration
/// * `version` - Application version
#[must_use]
pub fn server_config_from_config(config: &diagate_config::Config, version: String) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        gateway: GatewaySettings {
            kroki_base_url: config.kroki.base_url.clone(),
            allow_any_base_url: config.kroki.allow_any_base_url,
            allowed_base_urls: config.kroki.allowed_base_urls.clone(),
            max_code_length: config.limits.max_code_length,
            cache: CacheSettings {
                ttl: config.cache.ttl(),
                max_entries: config.cache.max_entries,
                prune_interval: config.cache.prune_interval(),
            },
        },
        kroki_timeout: config.kroki.timeout(),
        version,
    }
}
