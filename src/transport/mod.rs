//! Transport boundary and the direct-then-render fallback chain.
//!
//! A fetch first goes through the lightweight HTTP transport. When that
//! attempt fails, or its markup lacks the selector the caller requires, the
//! same job is replayed once on the rendering transport. Nothing is retried
//! beyond that.

mod chain;
mod job;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{has_selector, Attempt, FallbackChain, Fetched, Via};
pub use job::{Cookie, FetchJob, OutputKind};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// Body produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Textual body (markup or unparsed text).
    Text(String),
    /// Already-decoded structured data.
    Json(serde_json::Value),
    /// Raw bytes (images and other binary assets).
    Bytes(Vec<u8>),
}

impl Payload {
    /// Size of the body in bytes, for logging.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Json(v) => v.to_string().len(),
            Payload::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response from the direct HTTP transport.
#[derive(Debug, Clone)]
pub struct DirectResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub payload: Payload,
}

/// Lightweight HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET the job's URL. With `binary` set the body is returned as raw bytes.
    async fn get(
        &self,
        job: &FetchJob,
        binary: bool,
        timeout: Duration,
    ) -> Result<DirectResponse, TransportError>;

    /// POST a JSON body.
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Payload, TransportError>;
}

/// Rendering-capable transport (headless browser or worker pool).
///
/// Loads the job's URL, waits for its selector if any, and returns the
/// rendered markup, the parsed JSON document, or raw bytes when `binary` is set.
#[async_trait]
pub trait RenderTransport: Send + Sync {
    async fn render(
        &self,
        job: &FetchJob,
        kind: OutputKind,
        binary: bool,
        timeout: Duration,
    ) -> Result<Payload, TransportError>;
}
