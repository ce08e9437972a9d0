//! Internal constants for the render gateway.

use std::time::Duration;

/// Upstream Kroki base URL used when none is configured.
pub const DEFAULT_KROKI_URL: &str = "https://kroki.io";

/// Default HTTP timeout for Kroki requests (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum diagram source length, in characters.
pub const DEFAULT_MAX_CODE_LENGTH: usize = 100_000;

/// Maximum number of characters of an upstream error body kept for diagnostics.
pub const ERROR_DETAILS_LIMIT: usize = 2000;

/// `User-Agent` sent with every upstream request.
pub const USER_AGENT: &str = concat!("diagate/", env!("CARGO_PKG_VERSION"));
