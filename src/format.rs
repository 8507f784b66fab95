//! Legacy vs. SDK-style project detection.
//!
//! An SDK-style project declares its SDK on the root element
//! (`<Project Sdk="Microsoft.NET.Sdk">`); legacy projects import their
//! targets explicitly and carry no `Sdk` attribute. Detection only looks at
//! the root element and never evaluates the document.

use std::path::Path;

use crate::error::{Error, Result};

/// Layout of a project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    /// No `Sdk` attribute on the root element.
    Legacy,
    /// Root element declares an `Sdk`.
    Sdk,
}

impl ProjectFormat {
    pub fn is_legacy(self) -> bool {
        self == Self::Legacy
    }

    /// Detect the format from XML source text.
    ///
    /// The whole document must be well-formed, not only the root start tag,
    /// so a truncated or corrupt file is rejected here before any engine
    /// sees it.
    pub fn from_source(source: &str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(source)?;
        let format = if doc.root_element().has_attribute("Sdk") {
            Self::Sdk
        } else {
            Self::Legacy
        };
        Ok(format)
    }
}

impl std::fmt::Display for ProjectFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Sdk => f.write_str("sdk"),
        }
    }
}

/// Read `path` and detect its format.
pub fn detect(path: impl AsRef<Path>) -> Result<ProjectFormat> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let format = ProjectFormat::from_source(&source).map_err(|source| Error::Xml {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), %format, "detected project format");
    Ok(format)
}

/// `true` when the project file at `path` has no `Sdk` attribute on its root.
pub fn is_legacy_format(path: impl AsRef<Path>) -> Result<bool> {
    detect(path).map(ProjectFormat::is_legacy)
}
