//! Configuration management for diagate.
//!
//! Parses `diagate.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `kroki.base_url`
//! - `kroki.allowed_base_urls`
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [kroki]
//! base_url = "${KROKI_URL:-https://kroki.io}"
//! allowed_base_urls = "https://kroki.internal, http://localhost:8000"
//! timeout_secs = 10
//!
//! [cache]
//! ttl_secs = 120
//! max_entries = 200
//!
//! [limits]
//! max_code_length = 100000
//! ```

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override default Kroki base URL.
    pub kroki_url: Option<String>,
    /// Override the accept-any-base-URL flag.
    pub allow_any_base_url: Option<bool>,
    /// Override the base URL allowlist.
    pub allowed_base_urls: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "diagate.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Upstream Kroki configuration.
    pub kroki: KrokiConfig,
    /// Result cache configuration.
    pub cache: CacheConfig,
    /// Request limits.
    pub limits: LimitsConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
        }
    }
}

/// Upstream Kroki configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KrokiConfig {
    /// Default Kroki base URL.
    ///
    /// Not validated here: an unusable value fails each render instead.
    pub base_url: String,
    /// Accept any well-formed caller-supplied base URL.
    pub allow_any_base_url: bool,
    /// Comma or whitespace separated list of accepted caller-supplied base URLs.
    pub allowed_base_urls: String,
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for KrokiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://kroki.io".to_owned(),
            allow_any_base_url: false,
            allowed_base_urls: String::new(),
            timeout_secs: 10,
        }
    }
}

impl KrokiConfig {
    /// Upstream request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Result cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached render in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached renders.
    pub max_entries: usize,
    /// Minimum seconds between opportunistic prunes.
    pub prune_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 120,
            max_entries: 200,
            prune_interval_secs: 30,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Request limits.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum diagram source length in characters.
    pub max_code_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_code_length: 100_000,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`kroki.base_url`").
        field: String,
        /// Error message (e.g., "${`KROKI_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be greater than zero.
fn require_positive<T: Default + PartialEq>(value: T, field: &str) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

/// Upper bound for the `*_secs` settings (one year).
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Require a duration in seconds to be at most [`MAX_DURATION_SECS`].
fn require_at_most_a_year(value: u64, field: &str) -> Result<(), ConfigError> {
    if value > MAX_DURATION_SECS {
        return Err(ConfigError::Validation(format!(
            "{field} must be at most {MAX_DURATION_SECS} seconds"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `diagate.toml` in current directory and parents,
    /// falling back to defaults.
    ///
    /// CLI settings are applied after loading and take precedence over config
    /// file values. Validation runs last.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing or
    /// expansion fails, or the final values are invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(kroki_url) = &settings.kroki_url {
            self.kroki.base_url.clone_from(kroki_url);
        }
        if let Some(allow_any) = settings.allow_any_base_url {
            self.kroki.allow_any_base_url = allow_any;
        }
        if let Some(allowed) = &settings.allowed_base_urls {
            self.kroki.allowed_base_urls.clone_from(allowed);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        require_positive(self.kroki.timeout_secs, "kroki.timeout_secs")?;
        require_positive(self.cache.ttl_secs, "cache.ttl_secs")?;
        require_positive(self.cache.max_entries, "cache.max_entries")?;
        require_positive(self.limits.max_code_length, "limits.max_code_length")?;

        require_at_most_a_year(self.kroki.timeout_secs, "kroki.timeout_secs")?;
        require_at_most_a_year(self.cache.ttl_secs, "cache.ttl_secs")?;
        require_at_most_a_year(self.cache.prune_interval_secs, "cache.prune_interval_secs")?;

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.kroki.base_url = expand::expand_env(&self.kroki.base_url, "kroki.base_url")?;
        self.kroki.allowed_base_urls =
            expand::expand_env(&self.kroki.allowed_base_urls, "kroki.allowed_base_urls")?;
        Ok(())
    }
}
