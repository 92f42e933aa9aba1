//! Two-step fallback: direct HTTP first, rendering transport second.

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::{DirectResponse, FetchJob, HttpTransport, OutputKind, Payload, RenderTransport};
use crate::error::{FetchError, TransportError};

/// Which transport produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Direct,
    Rendered,
}

/// Outcome of the direct attempt.
#[derive(Debug)]
pub enum Attempt {
    /// Usable response.
    Ready(DirectResponse),
    /// The response arrived but is not usable as-is (missing selector).
    NeedsFallback(String),
}

/// Result of the chain.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub payload: Payload,
    /// Content type reported by the transport, when known.
    pub content_type: Option<String>,
    pub via: Via,
}

/// Check whether `selector` matches anything in `markup`.
///
/// An unparsable selector never matches.
pub fn has_selector(markup: &str, selector: &str) -> bool {
    let selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid selector '{}': {:?}", selector, e);
            return false;
        }
    };
    let document = Html::parse_document(markup);
    let found = document.select(&selector).next().is_some();
    found
}

/// Direct transport with a rendering fallback.
pub struct FallbackChain<'a> {
    direct: &'a dyn HttpTransport,
    render: &'a dyn RenderTransport,
    direct_timeout: Duration,
    render_timeout: Duration,
}

impl<'a> FallbackChain<'a> {
    pub fn new(
        direct: &'a dyn HttpTransport,
        render: &'a dyn RenderTransport,
        direct_timeout: Duration,
        render_timeout: Duration,
    ) -> Self {
        Self {
            direct,
            render,
            direct_timeout,
            render_timeout,
        }
    }

    /// Run the job through the chain. Each transport is tried at most once.
    pub async fn fetch(
        &self,
        job: &FetchJob,
        kind: OutputKind,
        binary: bool,
    ) -> Result<Fetched, FetchError> {
        match self.attempt_direct(job, binary).await {
            Ok(Attempt::Ready(response)) => {
                return Ok(Fetched {
                    payload: response.payload,
                    content_type: response.content_type,
                    via: Via::Direct,
                });
            }
            Ok(Attempt::NeedsFallback(reason)) => {
                debug!("Direct fetch of {} unusable ({}), rendering", job.url, reason);
            }
            Err(e) => {
                debug!("Direct fetch of {} failed ({}), rendering", job.url, e);
            }
        }

        let timeout = match job.timeout {
            Some(t) => t.max(self.render_timeout),
            None => self.render_timeout,
        };

        match self.render.render(job, kind, binary, timeout).await {
            Ok(payload) => Ok(Fetched {
                payload,
                content_type: None,
                via: Via::Rendered,
            }),
            Err(e) => {
                warn!("Rendering fetch of {} failed: {}", job.url, e);
                Err(FetchError::NoResponse)
            }
        }
    }

    /// Single direct attempt with selector validation.
    pub async fn attempt_direct(
        &self,
        job: &FetchJob,
        binary: bool,
    ) -> Result<Attempt, TransportError> {
        let timeout = job.timeout.unwrap_or(self.direct_timeout);
        let response = self.direct.get(job, binary, timeout).await?;
        debug!(
            "Direct fetch of {} returned HTTP {} ({} bytes)",
            job.url,
            response.status,
            response.payload.len()
        );

        if let (Some(selector), Payload::Text(body)) = (&job.wait_for_selector, &response.payload) {
            if !has_selector(body, selector) {
                return Ok(Attempt::NeedsFallback(format!(
                    "selector '{}' not found",
                    selector
                )));
            }
        }

        Ok(Attempt::Ready(response))
    }
}
