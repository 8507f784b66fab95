//! Switcher configuration files.
//!
//! A switcher configuration is a small JSON document that travels with a
//! solution and carries, among other things, extra global properties that
//! every project load should see:
//!
//! ```json
//! {
//!   "solution": "MySolution.sln",
//!   "globals": { "Configuration": "Release" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings read from a switcher configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitcherConfiguration {
    /// Solution file the configuration belongs to, relative to the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    /// Extra global properties applied to every project load.
    pub globals: HashMap<String, String>,
}

impl SwitcherConfiguration {
    /// Decode a configuration from JSON text.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_json(&source).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), globals = config.globals.len(), "loaded switcher configuration");
        Ok(config)
    }
}
