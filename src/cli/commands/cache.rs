//! Response cache maintenance commands.

use console::style;

use crate::cache::ResponseCache;
use crate::config::Settings;

use super::format_bytes;

/// Delete every cached entry of a source.
pub async fn cmd_cache_clear(settings: &Settings, source: &str) -> anyhow::Result<()> {
    let cache = ResponseCache::new(settings.cache_dir(source));
    let removed = cache.purge().await?;
    println!(
        "{} Removed {} cached entries for {}",
        style("✓").green(),
        removed,
        style(source).cyan()
    );
    Ok(())
}

/// Print the disk usage of a source's cache.
pub async fn cmd_cache_size(settings: &Settings, source: &str) -> anyhow::Result<()> {
    let cache = ResponseCache::new(settings.cache_dir(source));
    let bytes = cache.disk_usage().await?;
    println!(
        "{}: {} in {}",
        style(source).cyan(),
        format_bytes(bytes),
        cache.dir().display()
    );
    Ok(())
}
