//! Direct HTTP transport over reqwest.
//!
//! Sends the job's headers plus an assembled `Cookie` header and a referer.
//! JSON responses are decoded when they parse; anything else textual stays
//! text so the caller decides how strict to be.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER};
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{DirectResponse, FetchJob, HttpTransport, Payload};

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    source: String,
    user_agent: String,
    default_referer: Option<String>,
}

impl HttpClientBuilder {
    /// Referer used when a job does not carry its own.
    pub fn default_referer(mut self, referer: impl Into<String>) -> Self {
        self.default_referer = Some(referer.into());
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Fails if the TLS backend cannot be initialized.
    pub fn build(self) -> Result<HttpClient, TransportError> {
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(HttpClient {
            client,
            source: self.source,
            default_referer: self.default_referer,
        })
    }
}

/// Lightweight HTTP transport for one source.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    source: String,
    default_referer: Option<String>,
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("application/json") || ct.contains("+json")
    })
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

impl HttpClient {
    /// Start building a client for `source` with the given user agent.
    pub fn builder(source: &str, user_agent: &str) -> HttpClientBuilder {
        HttpClientBuilder {
            source: source.to_string(),
            user_agent: user_agent.to_string(),
            default_referer: None,
        }
    }

    fn apply_headers(
        &self,
        mut request: RequestBuilder,
        job: &FetchJob,
    ) -> RequestBuilder {
        for (name, value) in &job.headers {
            request = request.header(name, value);
        }
        if let Some(referer) = job.referer.as_ref().or(self.default_referer.as_ref()) {
            request = request.header(REFERER, referer);
        }
        if let Some(cookies) = job.cookie_header() {
            request = request.header(COOKIE, cookies);
        }
        request
    }

    async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout.as_millis() as u64)
            } else {
                TransportError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }

    async fn read_payload(
        response: Response,
        content_type: Option<&str>,
        binary: bool,
    ) -> Result<Payload, TransportError> {
        if binary {
            return Ok(Payload::Bytes(response.bytes().await?.to_vec()));
        }

        let text = response.text().await?;
        if is_json_content_type(content_type) {
            if let Ok(value) = serde_json::from_str(&text) {
                return Ok(Payload::Json(value));
            }
        }
        Ok(Payload::Text(text))
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn get(
        &self,
        job: &FetchJob,
        binary: bool,
        timeout: Duration,
    ) -> Result<DirectResponse, TransportError> {
        debug!("[{}] GET {} (timeout {:?})", self.source, job.url, timeout);

        let request = self.apply_headers(self.client.get(&job.url).timeout(timeout), job);
        let response = Self::send(request, timeout).await?;
        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let payload = Self::read_payload(response, content_type.as_deref(), binary).await?;

        Ok(DirectResponse {
            status,
            content_type,
            payload,
        })
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Payload, TransportError> {
        debug!("[{}] POST {}", self.source, url);

        let mut request = self.client.post(url).json(body).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let has_referer = headers.keys().any(|k| k.eq_ignore_ascii_case("referer"));
        if let (false, Some(referer)) = (has_referer, &self.default_referer) {
            request = request.header(REFERER, referer);
        }

        let response = Self::send(request, timeout).await?;
        let content_type = content_type_of(&response);
        Self::read_payload(response, content_type.as_deref(), false).await
    }
}
