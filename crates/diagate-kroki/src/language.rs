//! Diagram engines and output formats accepted by the gateway.

/// Supported diagram engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Mermaid,
    PlantUml,
    GraphViz,
    /// Mermaid flowcharts, tracked separately for labeling only.
    Flowchart,
}

impl Engine {
    /// All engines, in display order.
    pub const ALL: [Self; 4] = [Self::Mermaid, Self::PlantUml, Self::GraphViz, Self::Flowchart];

    /// Parse an engine from its wire name.
    ///
    /// Matching is exact and case-sensitive. Returns None if the engine is
    /// not supported.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mermaid" => Some(Self::Mermaid),
            "plantuml" => Some(Self::PlantUml),
            "graphviz" => Some(Self::GraphViz),
            "flowchart" => Some(Self::Flowchart),
            _ => None,
        }
    }

    /// Wire name of this engine, as sent by clients.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::PlantUml => "plantuml",
            Self::GraphViz => "graphviz",
            Self::Flowchart => "flowchart",
        }
    }

    /// Kroki endpoint name for this engine.
    ///
    /// `flowchart` is an alias and renders through the Mermaid endpoint.
    #[must_use]
    pub fn kroki_endpoint(self) -> &'static str {
        match self {
            Self::Mermaid | Self::Flowchart => "mermaid",
            Self::PlantUml => "plantuml",
            Self::GraphViz => "graphviz",
        }
    }
}

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// SVG document, returned to clients as text.
    #[default]
    Svg,
    /// PNG image.
    Png,
    /// PDF document.
    Pdf,
}

impl Format {
    /// All formats, in display order.
    pub const ALL: [Self; 3] = [Self::Svg, Self::Png, Self::Pdf];

    /// Parse a format from its wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Return format as string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    /// MIME type requested from Kroki and used when it declares none.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }

    /// File extension for downloads.
    #[must_use]
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Whether rendered output is text (vector) rather than binary.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Svg)
    }
}
