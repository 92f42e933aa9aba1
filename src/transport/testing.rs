//! Fake transports for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DirectResponse, FetchJob, HttpTransport, OutputKind, Payload, RenderTransport};
use crate::error::TransportError;

/// Direct transport returning a canned response or failing.
pub(crate) struct FakeHttp {
    response: Option<DirectResponse>,
    calls: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
    last_job: Mutex<Option<FetchJob>>,
}

impl FakeHttp {
    pub(crate) fn new(response: Option<DirectResponse>) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            last_timeout: Mutex::new(None),
            last_job: Mutex::new(None),
        }
    }

    pub(crate) fn text(body: &str) -> Self {
        Self::new(Some(DirectResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            payload: Payload::Text(body.to_string()),
        }))
    }

    pub(crate) fn json(value: serde_json::Value) -> Self {
        Self::new(Some(DirectResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            payload: Payload::Json(value),
        }))
    }

    pub(crate) fn bytes(content_type: &str, data: Vec<u8>) -> Self {
        Self::new(Some(DirectResponse {
            status: 200,
            content_type: Some(content_type.to_string()),
            payload: Payload::Bytes(data),
        }))
    }

    pub(crate) fn failing() -> Self {
        Self::new(None)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock().unwrap()
    }

    pub(crate) fn last_job(&self) -> Option<FetchJob> {
        self.last_job.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeHttp {
    async fn get(
        &self,
        job: &FetchJob,
        _binary: bool,
        timeout: Duration,
    ) -> Result<DirectResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().unwrap() = Some(timeout);
        *self.last_job.lock().unwrap() = Some(job.clone());
        self.response
            .clone()
            .ok_or(TransportError::Status(503))
    }

    async fn post(
        &self,
        _url: &str,
        _body: &serde_json::Value,
        _headers: &HashMap<String, String>,
        _timeout: Duration,
    ) -> Result<Payload, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .map(|r| r.payload)
            .ok_or(TransportError::Status(500))
    }
}

/// Rendering transport returning a canned payload or failing.
pub(crate) struct FakeRender {
    payload: Option<Payload>,
    calls: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
}

impl FakeRender {
    pub(crate) fn new(payload: Option<Payload>) -> Self {
        Self {
            payload,
            calls: AtomicUsize::new(0),
            last_timeout: Mutex::new(None),
        }
    }

    pub(crate) fn text(body: &str) -> Self {
        Self::new(Some(Payload::Text(body.to_string())))
    }

    pub(crate) fn bytes(data: Vec<u8>) -> Self {
        Self::new(Some(Payload::Bytes(data)))
    }

    pub(crate) fn failing() -> Self {
        Self::new(None)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock().unwrap()
    }
}

#[async_trait]
impl RenderTransport for FakeRender {
    async fn render(
        &self,
        _job: &FetchJob,
        _kind: OutputKind,
        _binary: bool,
        timeout: Duration,
    ) -> Result<Payload, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().unwrap() = Some(timeout);
        self.payload
            .clone()
            .ok_or_else(|| TransportError::Render("page crashed".to_string()))
    }
}

/// Smallest valid PNG: signature plus IHDR.
pub(crate) fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
    data.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    data.extend_from_slice(&[0x1F, 0x15, 0xC4, 0x89]);
    data
}
