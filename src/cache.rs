//! On-disk response cache for downloaded assets.
//!
//! Entries live in one flat directory per source. The filename of an entry is
//! a pure function of the normalized request URL, so a later request for the
//! same asset finds it without touching the network. Content types are not
//! stored; callers re-detect them from the bytes on a hit.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::utils::detect_content_type;

/// Longest sanitized URL prefix kept in a cache filename.
const MAX_NAME_LEN: usize = 100;
/// Hex characters of the URL hash appended to every filename.
const HASH_LEN: usize = 16;

/// Normalize a URL for caching: origin and path, plus the query string when
/// the response depends on it. Fragments never count.
pub fn normalize_url(url: &str, depends_on_params: bool) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut normalized = format!(
                "{}{}",
                parsed.origin().ascii_serialization(),
                parsed.path()
            );
            if depends_on_params {
                if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
                    normalized.push('?');
                    normalized.push_str(query);
                }
            }
            normalized
        }
        Err(_) => {
            let without_fragment = url.split('#').next().unwrap_or(url);
            if depends_on_params {
                without_fragment.to_string()
            } else {
                without_fragment
                    .split('?')
                    .next()
                    .unwrap_or(without_fragment)
                    .to_string()
            }
        }
    }
}

/// Replace characters that are unsafe in filenames.
fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' | '.' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim_matches('_');
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// Cache filename for a request URL.
///
/// The readable prefix is the sanitized normalized URL; the hash suffix keeps
/// distinct URLs apart even when their prefixes collide after sanitizing or
/// truncation.
pub fn cache_key(url: &str, depends_on_params: bool) -> String {
    let normalized = normalize_url(url, depends_on_params);
    let hash = hex::encode(Sha256::digest(normalized.as_bytes()));
    format!("{}-{}", sanitize(&normalized), &hash[..HASH_LEN])
}

/// A cached entry with its re-detected content type.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAsset {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Flat on-disk cache for one source.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read an entry. Missing or unreadable entries are misses.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => {
                debug!("Cache hit: {}", key);
                Some(data)
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Unreadable cache entry {}: {}", key, e);
                }
                None
            }
        }
    }

    /// Read an entry and re-detect its content type.
    ///
    /// The bytes are sniffed first; `url` supplies the extension fallback for
    /// formats without a magic number (SVG).
    pub async fn get_with_type(&self, key: &str, url: Option<&str>) -> Option<CachedAsset> {
        let data = self.get(key).await?;
        let content_type = detect_content_type(&data, None, url);
        Some(CachedAsset { data, content_type })
    }

    /// Store an entry, creating the cache directory on first use.
    pub async fn put(&self, key: &str, data: &[u8]) -> std::io::Result<()> {
        if tokio::fs::metadata(&self.dir).await.is_err() {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!("Created cache directory {}", self.dir.display());
        }
        tokio::fs::write(self.path_for(key), data).await?;
        debug!("Cached {} ({} bytes)", key, data.len());
        Ok(())
    }

    /// Remove every cached entry. Returns how many files were deleted.
    pub async fn purge(&self) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        info!("Purged {} entries from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// Total size of cached entries in bytes.
    pub async fn disk_usage(&self) -> std::io::Result<u64> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut total = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_url() {
        let url = "https://Example.com/img/1.png?w=100#top";
        assert_eq!(normalize_url(url, false), "https://example.com/img/1.png");
        assert_eq!(normalize_url(url, true), "https://example.com/img/1.png?w=100");
        assert_eq!(
            normalize_url("https://example.com/a.png?", true),
            "https://example.com/a.png"
        );
        assert_eq!(normalize_url("not a url?x=1", false), "not a url");
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("https://example.com/covers/1.jpg?token=abc", false);
        let b = cache_key("https://example.com/covers/1.jpg?token=xyz", false);
        assert_eq!(a, b);
        assert_eq!(a, cache_key("https://example.com/covers/1.jpg?token=abc", false));
        assert!(!a.contains('/'));
        assert!(!a.contains(':'));
    }

    #[test]
    fn test_cache_key_respects_params() {
        let a = cache_key("https://example.com/image.php?id=1", true);
        let b = cache_key("https://example.com/image.php?id=2", true);
        assert_ne!(a, b);
        assert_ne!(a, cache_key("https://example.com/image.php?id=1", false));
    }

    #[test]
    fn test_cache_key_length_is_bounded() {
        let long = format!("https://example.com/{}", "a".repeat(500));
        let key = cache_key(&long, false);
        assert!(key.chars().count() <= MAX_NAME_LEN + 1 + HASH_LEN);
        assert_ne!(key, cache_key(&format!("{}b", long), false));
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join("missing"));
        assert_eq!(cache.get("nothing").await, None);
        assert_eq!(cache.disk_usage().await.unwrap(), 0);
        assert_eq!(cache.purge().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_get_and_type_detection() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join(".cache").join("demo"));
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let key = cache_key("https://example.com/a.png", false);

        cache.put(&key, &png).await.unwrap();

        let asset = cache.get_with_type(&key, None).await.unwrap();
        assert_eq!(asset.data, png);
        assert_eq!(asset.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_type_without_magic_number_uses_url() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/logo.svg";
        let key = cache_key(url, false);
        cache.put(&key, b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>").await.unwrap();

        let bare = cache.get_with_type(&key, None).await.unwrap();
        assert_eq!(bare.content_type, None);

        let asset = cache.get_with_type(&key, Some(url)).await.unwrap();
        assert_eq!(asset.content_type.as_deref(), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn test_purge_and_disk_usage() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path());
        cache.put("a", b"12345").await.unwrap();
        cache.put("b", b"123").await.unwrap();

        assert_eq!(cache.disk_usage().await.unwrap(), 8);
        assert_eq!(cache.purge().await.unwrap(), 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.disk_usage().await.unwrap(), 0);
    }
}
