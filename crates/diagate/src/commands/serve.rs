//! `diagate serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use diagate_config::{CliSettings, Config};
use diagate_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Configuration and upstream options shared by all commands.
#[derive(Args)]
pub(crate) struct KrokiArgs {
    /// Path to configuration file (default: auto-discover diagate.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Default Kroki base URL (overrides config).
    #[arg(long, env = "KROKI_BASE_URL")]
    pub kroki_url: Option<String>,

    /// Accept any caller-supplied Kroki base URL.
    #[arg(long, env = "KROKI_ALLOW_ANY_BASE_URL")]
    pub allow_any_kroki_base_url: bool,

    /// Comma or whitespace separated Kroki base URLs callers may choose (overrides config).
    #[arg(long, env = "KROKI_ALLOWED_BASE_URLS")]
    pub kroki_allowed_base_urls: Option<String>,

    /// Enable verbose output (info-level logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl KrokiArgs {
    /// Load configuration with these arguments and `host`/`port` applied.
    pub(crate) fn load_config(
        &self,
        host: Option<String>,
        port: Option<u16>,
    ) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            host,
            port,
            kroki_url: self.kroki_url.clone(),
            allow_any_base_url: self.allow_any_kroki_base_url.then_some(true),
            allowed_base_urls: self.kroki_allowed_base_urls.clone(),
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }
}

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub kroki: KrokiArgs,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.kroki.load_config(self.host, self.port)?;

        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }
        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!("Kroki URL: {}", config.kroki.base_url));
        if config.kroki.allow_any_base_url {
            output.warning("Caller-supplied Kroki base URLs: any (allowlist ignored)");
        } else if !config.kroki.allowed_base_urls.trim().is_empty() {
            output.info(&format!(
                "Caller-supplied Kroki base URLs: {}",
                config.kroki.allowed_base_urls
            ));
        }
        output.info(&format!(
            "Cache: {} entries, {}s TTL",
            config.cache.max_entries, config.cache.ttl_secs
        ));

        let server_config = server_config_from_config(&config, version.to_owned());
        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }
}
