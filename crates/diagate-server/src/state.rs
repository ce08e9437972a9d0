//! Application state.
//!
//! Shared state for all request handlers.

use diagate_kroki::Gateway;

/// Application state shared across all handlers.
pub struct AppState {
    /// Render gateway owning the result cache and in-flight registry.
    pub(crate) gateway: Gateway,
    /// Application version reported by the health check.
    pub(crate) version: String,
}

impl AppState {
    /// Create state around a gateway.
    #[must_use]
    pub fn new(gateway: Gateway, version: impl Into<String>) -> Self {
        Self {
            gateway,
            version: version.into(),
        }
    }
}
