//! Rendering transport configuration.

use serde::{Deserialize, Serialize};

/// Browser configuration for the rendering transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply `BROWSER_URL`, `BROWSER_HEADLESS` and `SOCKS_PROXY` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BROWSER_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.remote_url = Some(url.to_string());
            }
        }
        if let Ok(value) = std::env::var("BROWSER_HEADLESS") {
            self.headless = crate::config::parse_flag(&value);
        }
        if let Ok(proxy) = std::env::var("SOCKS_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrowserEngineConfig::default();
        assert!(config.headless);
        assert!(config.remote_url.is_none());
        assert!(config.chrome_args.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BrowserEngineConfig =
            serde_json::from_str(r#"{"remote_url": "ws://localhost:9222"}"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.remote_url.as_deref(), Some("ws://localhost:9222"));
    }
}
