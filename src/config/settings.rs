//! Application settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

use super::{parse_flag, APP_DIR_NAME, USER_DATA_ENV};

/// Subdirectory holding one response cache directory per source.
const CACHE_SUBDIR: &str = ".cache";
/// Subdirectory holding one options file per source.
const OPTIONS_SUBDIR: &str = ".options";

/// Default timeout for the direct HTTP transport.
pub const DEFAULT_DIRECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for the rendering transport.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// User-data root. Cache, options and served folders live below it.
    pub user_data: PathBuf,
    /// Application-wide cache policy. A source caches when this or its own flag is on.
    pub cache_enabled: bool,
    /// Timeout for the direct HTTP attempt.
    pub direct_timeout: Duration,
    /// Timeout for the rendering attempt.
    pub render_timeout: Duration,
    /// User agent for direct requests.
    pub user_agent: String,
}

impl Settings {
    /// Create settings rooted at an explicit user-data directory.
    pub fn with_user_data(user_data: impl Into<PathBuf>) -> Self {
        Self {
            user_data: user_data.into(),
            cache_enabled: false,
            direct_timeout: DEFAULT_DIRECT_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Build settings from the environment.
    ///
    /// The root comes from `MIRROR_FETCH_USER_DATA`, else the platform data
    /// directory. Fails with `ConfigurationMissing` when neither resolves.
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_data = match std::env::var(USER_DATA_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| ConfigError::ConfigurationMissing(USER_DATA_ENV.to_string()))?,
        };

        Ok(Self::with_user_data(user_data).with_env_overrides())
    }

    /// Apply `MIRROR_FETCH_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("MIRROR_FETCH_CACHE") {
            self.cache_enabled = parse_flag(&value);
        }
        if let Some(ms) = env_millis("MIRROR_FETCH_DIRECT_TIMEOUT_MS") {
            self.direct_timeout = ms;
        }
        if let Some(ms) = env_millis("MIRROR_FETCH_RENDER_TIMEOUT_MS") {
            self.render_timeout = ms;
        }
        if let Ok(ua) = std::env::var("MIRROR_FETCH_USER_AGENT") {
            if !ua.trim().is_empty() {
                self.user_agent = ua;
            }
        }
        self
    }

    /// Response cache directory for a source: `<root>/.cache/<source>/`.
    pub fn cache_dir(&self, source: &str) -> PathBuf {
        self.user_data.join(CACHE_SUBDIR).join(source)
    }

    /// Options file for a source: `<root>/.options/<source>.json`.
    pub fn options_path(&self, source: &str) -> PathBuf {
        self.user_data
            .join(OPTIONS_SUBDIR)
            .join(format!("{}.json", source))
    }

    /// Folder backing an ephemeral file server.
    pub fn served_dir(&self, folder: &str) -> PathBuf {
        self.user_data.join(folder)
    }

    /// Check that the user-data root is usable, creating it if needed.
    pub fn ensure_root(&self) -> Result<&Path, ConfigError> {
        std::fs::create_dir_all(&self.user_data).map_err(|e| {
            ConfigError::ConfigurationMissing(format!(
                "user data directory '{}': {}",
                self.user_data.display(),
                e
            ))
        })?;
        Ok(&self.user_data)
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
