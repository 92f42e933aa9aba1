//! CLI command implementations.

mod cache;
mod fetch;
mod serve;

pub use cache::{cmd_cache_clear, cmd_cache_size};
pub use fetch::{cmd_fetch, cmd_image};
pub use serve::cmd_serve;

use std::sync::Arc;

use url::Url;

use crate::config::Settings;
use crate::file_server::FileServer;
use crate::mirror::{Mirror, MirrorInfo};
use crate::transport::RenderTransport;

/// Source name used for ad-hoc fetches from the command line.
const CLI_SOURCE: &str = "cli";
/// Folder, under the user-data root, backing served files.
pub(crate) const SERVED_FOLDER: &str = "files";

#[cfg(feature = "browser")]
fn render_transport(no_browser: bool) -> Arc<dyn RenderTransport> {
    use crate::browser::{BrowserEngineConfig, BrowserTransport, NoBrowser};

    if no_browser {
        return Arc::new(NoBrowser);
    }
    Arc::new(BrowserTransport::new(
        BrowserEngineConfig::default().with_env_overrides(),
    ))
}

#[cfg(not(feature = "browser"))]
fn render_transport(_no_browser: bool) -> Arc<dyn RenderTransport> {
    Arc::new(crate::browser::NoBrowser)
}

/// Build the `cli` mirror, using the URL's origin as its host.
///
/// Opening the file server purges the served folder, so it is only opened
/// when `serve_pages` asks for it.
async fn cli_mirror(
    settings: &Settings,
    no_browser: bool,
    url: &str,
    serve_pages: bool,
) -> anyhow::Result<Mirror> {
    let parsed = Url::parse(url)?;
    let mut info = MirrorInfo::new(CLI_SOURCE, &parsed.origin().ascii_serialization());
    info.display_name = "Command line".to_string();
    info.wait_time_ms = 0;

    let mut builder = Mirror::builder(info, settings.clone()).render(render_transport(no_browser));
    if serve_pages {
        builder = builder.file_server(FileServer::open(settings.served_dir(SERVED_FOLDER)).await?);
    }
    Ok(builder.build()?)
}

/// Format a byte count for display.
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} bytes", bytes)
    }
}
