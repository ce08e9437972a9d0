//! `diagate render` command implementation.
//!
//! Renders one diagram through the same gateway the server uses, which makes
//! it a quick check that the configured Kroki upstream is reachable.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use diagate_server::{render_once, server_config_from_config};
use serde_json::json;

use super::serve::KrokiArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    pub kroki: KrokiArgs,

    /// Diagram engine (mermaid, plantuml, graphviz, flowchart).
    #[arg(short, long)]
    engine: String,

    /// Output format (svg, png, pdf).
    #[arg(short, long, default_value = "svg")]
    format: String,

    /// Diagram source file, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Kroki base URL for this render (must be allowed by config).
    #[arg(long)]
    base_url: Option<String>,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, the render fails, or
    /// the output cannot be written.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.kroki.load_config(None, None)?;
        let gateway = server_config_from_config(&config, version.to_owned()).build_gateway();

        let source = read_source(&self.input)?;
        let body = json!({
            "engine": self.engine,
            "format": self.format,
            "code": source,
            "krokiBaseUrl": self.base_url,
        });
        let (request, outcome) = render_once(&gateway, body.to_string().as_bytes()).await?;
        let bytes = outcome.rendered.payload.as_bytes();

        output.artifact(bytes, self.output.as_deref())?;

        output.success(&format!(
            "Rendered {} {} ({} bytes, {}) via {}",
            request.engine().as_str(),
            request.format().as_str(),
            bytes.len(),
            outcome.rendered.content_type,
            outcome.kroki_url,
        ));
        Ok(())
    }
}

/// Read diagram source from a file, or stdin for `-`.
fn read_source(input: &Path) -> Result<String, CliError> {
    if input.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}
