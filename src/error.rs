//! Error types for fetching, transports and configuration.

use thiserror::Error;

/// Errors surfaced by the fetch operations of a [`Mirror`](crate::mirror::Mirror).
///
/// The display strings are the stable error codes scrapers report upward.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Both the direct and the rendering transport failed.
    #[error("no_response")]
    NoResponse,
    /// The body could not be parsed as JSON where structured data was required.
    #[error("invalid_json")]
    InvalidJson,
    /// The caller asked for an output kind that does not exist.
    #[error("unknown_type: {0}")]
    UnknownType(String),
    /// A JSON value cannot be turned into a markup tree.
    #[error("cant_parse_json_to_html")]
    CantParseJsonToHtml,
    #[error("unknown_fetch_error")]
    Unknown(String),
}

/// Failure of a single transport attempt. Never leaves the fallback chain.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("render failed: {0}")]
    Render(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Configuration and filesystem errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required root path or environment value is absent. Fatal at construction.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}
