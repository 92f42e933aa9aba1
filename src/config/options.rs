//! Per-source options persisted as JSON under `.options/`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

fn default_enabled() -> bool {
    true
}

/// Options for one source. Survive restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Whether the source is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether downloaded assets are cached on disk.
    #[serde(default)]
    pub cache: bool,
    /// Free-form source-specific options.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            cache: false,
            options: serde_json::Map::new(),
        }
    }
}

impl SourceOptions {
    /// Load options from `path`, writing defaults when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No options at {}, writing defaults", path.display());
                let options = Self::default();
                options.save(path)?;
                Ok(options)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write options to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a free-form option.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }
}
