//! Terminal output for the CLI.
//!
//! Status lines go to stderr and rendered artifacts go to stdout (or a
//! file), so `diagate render ... > out.svg` captures only the diagram.

use std::io::{self, Write};
use std::path::Path;

use console::{Style, Term};

/// Status line and artifact writer.
pub(crate) struct Output {
    status: Term,
    green: Style,
    yellow: Style,
    red: Style,
}

impl Output {
    /// Create a writer whose colors follow stderr's terminal support.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            status: Term::stderr(),
            green: Style::new().green().for_stderr(),
            yellow: Style::new().yellow().for_stderr(),
            red: Style::new().red().for_stderr(),
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        self.status_line(msg);
    }

    pub(crate) fn success(&self, msg: &str) {
        self.status_line(&self.green.apply_to(msg).to_string());
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.status_line(&self.yellow.apply_to(msg).to_string());
    }

    pub(crate) fn error(&self, msg: &str) {
        self.status_line(&self.red.apply_to(msg).to_string());
    }

    /// Write a rendered artifact to `path`, or to stdout when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or stdout cannot be written.
    pub(crate) fn artifact(&self, bytes: &[u8], path: Option<&Path>) -> io::Result<()> {
        match path {
            Some(path) => std::fs::write(path, bytes),
            None => write_artifact(&mut io::stdout().lock(), bytes),
        }
    }

    /// Status lines are best effort: a closed stderr must not fail a render.
    fn status_line(&self, msg: &str) {
        if let Err(e) = self.status.write_line(msg) {
            tracing::debug!(error = %e, "Failed to write status line");
        }
    }
}

fn write_artifact(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()
}
