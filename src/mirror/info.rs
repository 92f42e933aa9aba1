//! Static description of a mirror.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Metadata of one content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorInfo {
    /// Unique source name. Also names the cache directory and options file.
    pub name: String,
    pub display_name: String,
    /// Canonical origin, e.g. `https://example.com`.
    pub host: String,
    #[serde(default)]
    pub alt_hosts: Vec<String>,
    pub langs: Vec<String>,
    /// 0 to 1.
    pub quality: f32,
    /// 0 to 1.
    pub speed: f32,
    /// 0 to 1.
    pub popularity: f32,
    /// Base wait between two requests to this source.
    pub wait_time_ms: u64,
    /// Whether an entry exists once per language or is shared across languages.
    pub entries_per_language: bool,
}

impl MirrorInfo {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            host: host.trim_end_matches('/').to_string(),
            alt_hosts: Vec::new(),
            langs: vec!["en".to_string()],
            quality: 0.5,
            speed: 0.5,
            popularity: 0.5,
            wait_time_ms: 200,
            entries_per_language: false,
        }
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// Whether `url` points at this mirror's canonical host or one of its
    /// alternates. Scheme, port and a leading `www.` are ignored.
    pub fn is_mirror_url(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        std::iter::once(&self.host)
            .chain(self.alt_hosts.iter())
            .filter_map(|candidate| host_of(candidate))
            .any(|candidate| candidate == host)
    }
}

/// Lowercased host without `www.`; accepts full URLs and bare hostnames.
fn host_of(value: &str) -> Option<String> {
    let value = value.trim();
    let parsed = Url::parse(value).or_else(|_| Url::parse(&format!("https://{}", value)));
    let host = parsed.ok()?.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
