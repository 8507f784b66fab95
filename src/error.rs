use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while loading or inspecting a project file.
#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be read.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file is not well-formed XML.
    #[error("{}: XML error: {source}", .path.display())]
    Xml {
        path: PathBuf,
        source: roxmltree::Error,
    },

    /// The build engine rejected the file as a project.
    #[error("{}: invalid project file: {message}", .path.display())]
    InvalidProject { path: PathBuf, message: String },

    /// Loading a project failed; `source` holds the underlying cause.
    #[error("Not a project: {}", .path.display())]
    ProjectLoad {
        path: PathBuf,
        source: Box<Error>,
    },

    /// A switcher configuration file could not be decoded.
    #[error("{}: invalid configuration: {source}", .path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub(crate) fn invalid_project(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::InvalidProject {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// The path the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. }
            | Self::Xml { path, .. }
            | Self::InvalidProject { path, .. }
            | Self::ProjectLoad { path, .. }
            | Self::Config { path, .. } => path,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
