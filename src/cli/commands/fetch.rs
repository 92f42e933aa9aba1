//! Ad-hoc fetch commands.

use console::style;

use crate::config::Settings;
use crate::mirror::{FetchResult, ImageReturn};
use crate::transport::FetchJob;

use super::cli_mirror;

/// Fetch a URL and print it in the requested kind.
pub async fn cmd_fetch(
    settings: &Settings,
    no_browser: bool,
    url: &str,
    kind: &str,
    selector: Option<String>,
    referer: Option<String>,
) -> anyhow::Result<()> {
    let mirror = cli_mirror(settings, no_browser, url, false).await?;

    let mut job = FetchJob::new(url);
    job.wait_for_selector = selector;
    job.referer = referer;

    match mirror.fetch_kind(&job, kind).await? {
        FetchResult::Html(markup) | FetchResult::Text(markup) => println!("{}", markup),
        FetchResult::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    }
    Ok(())
}

/// Download an image and print its data URI or served path.
pub async fn cmd_image(
    settings: &Settings,
    no_browser: bool,
    url: &str,
    page: bool,
    depends_on_params: bool,
) -> anyhow::Result<()> {
    let mirror = cli_mirror(settings, no_browser, url, page).await?;
    let ret = if page { ImageReturn::Page } else { ImageReturn::Cover };

    match mirror.download_image(url, ret, None, depends_on_params, None).await {
        Some(result) => {
            println!("{}", result);
            if let Some(files) = mirror.file_server() {
                eprintln!("  {} stored in {}", style("✓").green(), files.dir().display());
            }
            Ok(())
        }
        None => {
            eprintln!("{} No image at {}", style("✗").red(), url);
            Err(anyhow::anyhow!("no image downloaded"))
        }
    }
}
