//! Rendering transport backed by a headless Chromium over CDP.
//!
//! The browser is launched (or connected to, when `BROWSER_URL` is set) on
//! first use and shared by every render. Each render gets its own page,
//! which is always closed afterwards.

mod config;
#[cfg(feature = "browser")]
mod render;

pub use config::BrowserEngineConfig;
#[cfg(feature = "browser")]
pub use render::BrowserTransport;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{FetchJob, OutputKind, Payload, RenderTransport};

/// Rendering transport used when no browser is available.
///
/// Every render fails, so the fallback chain reports `no_response` whenever
/// the direct attempt is not enough.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

#[async_trait]
impl RenderTransport for NoBrowser {
    async fn render(
        &self,
        job: &FetchJob,
        _kind: OutputKind,
        _binary: bool,
        _timeout: Duration,
    ) -> Result<Payload, TransportError> {
        Err(TransportError::Unavailable(format!(
            "no rendering transport configured for {}",
            job.url
        )))
    }
}
