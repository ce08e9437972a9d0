//! Render cache key computation.
//!
//! Provides [`DiagramKey`] for deriving content-addressed keys shared by the
//! result cache and the request coalescer.

use sha2::{Digest, Sha256};

use crate::language::{Engine, Format};

/// Separator between key components.
///
/// Normalized base URLs cannot contain a line feed and engine and format
/// names are fixed identifiers, so components cannot bleed into each other.
const SEPARATOR: char = '\n';

/// Render parameters for cache key computation.
///
/// Contains everything that affects the upstream response.
#[derive(Debug, Clone, Copy)]
pub struct DiagramKey<'a> {
    /// Normalized effective Kroki base URL.
    pub base_url: &'a str,
    /// Requested engine (aliases stay distinct).
    pub engine: Engine,
    /// Requested output format.
    pub format: Format,
    /// Diagram source text.
    pub source: &'a str,
}

impl DiagramKey<'_> {
    /// SHA-256 of the diagram source, hex-encoded.
    #[must_use]
    pub fn source_digest(&self) -> String {
        hex::encode(Sha256::digest(self.source.as_bytes()))
    }

    /// Compute the cache key for these parameters.
    ///
    /// # Key Format
    ///
    /// `"{base_url}\n{engine}\n{format}\n{sha256(source)}"`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "{base}{SEPARATOR}{engine}{SEPARATOR}{format}{SEPARATOR}{digest}",
            base = self.base_url,
            engine = self.engine.as_str(),
            format = self.format.as_str(),
            digest = self.source_digest(),
        )
    }
}
