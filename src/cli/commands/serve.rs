//! Static server for the ephemeral files folder.

use std::net::SocketAddr;

use console::style;

use crate::config::Settings;
use crate::file_server::router;

use super::SERVED_FOLDER;

/// Serve `<user-data>/files` under `/files`.
pub async fn cmd_serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let folder = settings.served_dir(SERVED_FOLDER);
    tokio::fs::create_dir_all(&folder).await?;

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    println!(
        "{} Serving {} at http://{}/files/",
        style("→").cyan(),
        folder.display(),
        addr
    );
    println!("  Press Ctrl+C to stop");
    tracing::info!("Starting file server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(&folder)).await?;
    Ok(())
}
