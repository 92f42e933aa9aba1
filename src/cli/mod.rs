//! Command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "mirror-fetch")]
#[command(about = "Rate-limited fetch and cache engine for content mirrors")]
#[command(version)]
pub struct Cli {
    /// User-data root (overrides MIRROR_FETCH_USER_DATA)
    #[arg(long, global = true)]
    user_data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable the headless browser fallback
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print the result
    Fetch {
        url: String,
        /// Output kind: html, json or string
        #[arg(short, long, default_value = "string")]
        kind: String,
        /// Selector that must be present, otherwise the page is rendered
        #[arg(short, long)]
        selector: Option<String>,
        /// Referer header
        #[arg(short, long)]
        referer: Option<String>,
    },

    /// Download an image and print its data URI (or served path with --page)
    Image {
        url: String,
        /// Serve the image instead of inlining it
        #[arg(long)]
        page: bool,
        /// Treat query parameters as part of the cache key
        #[arg(long)]
        params: bool,
    },

    /// Inspect or clear a source's response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Serve the ephemeral files folder over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3030")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete every cached entry of a source
    Clear { source: String },
    /// Show the disk usage of a source's cache
    Size { source: String },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match cli.user_data {
        Some(root) => Settings::with_user_data(root).with_env_overrides(),
        None => Settings::from_env()?,
    };

    match cli.command {
        Commands::Fetch {
            url,
            kind,
            selector,
            referer,
        } => {
            commands::cmd_fetch(&settings, cli.no_browser, &url, &kind, selector, referer).await
        }
        Commands::Image { url, page, params } => {
            commands::cmd_image(&settings, cli.no_browser, &url, page, params).await
        }
        Commands::Cache { command } => match command {
            CacheCommands::Clear { source } => commands::cmd_cache_clear(&settings, &source).await,
            CacheCommands::Size { source } => commands::cmd_cache_size(&settings, &source).await,
        },
        Commands::Serve { port, host } => commands::cmd_serve(&settings, &host, port).await,
    }
}
