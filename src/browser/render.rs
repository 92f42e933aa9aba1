//! chromiumoxide implementation of the rendering transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::handler::{Handler, HandlerConfig};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::BrowserEngineConfig;
use crate::error::TransportError;
use crate::transport::{FetchJob, OutputKind, Payload, RenderTransport};

/// Interval between selector probes while waiting for dynamic content.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

fn render_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Render(e.to_string())
}

fn find_chrome() -> Result<PathBuf, TransportError> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    for cmd in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(cmd) {
            return Ok(path);
        }
    }
    Err(TransportError::Unavailable(
        "Chrome/Chromium not found; install it or set BROWSER_URL".to_string(),
    ))
}

/// Script fetching `url` from inside the page session and returning it base64-encoded.
fn binary_fetch_script(url: &str) -> Result<String, TransportError> {
    let url = serde_json::to_string(url).map_err(render_err)?;
    Ok(format!(
        r#"
        (async () => {{
            try {{
                const response = await fetch({url}, {{ credentials: 'include' }});
                if (!response.ok) {{
                    return {{ error: `HTTP ${{response.status}}` }};
                }}
                const bytes = new Uint8Array(await response.arrayBuffer());
                let binary = '';
                for (let i = 0; i < bytes.length; i++) {{
                    binary += String.fromCharCode(bytes[i]);
                }}
                return {{ data: btoa(binary) }};
            }} catch (e) {{
                return {{ error: e.toString() }};
            }}
        }})()
        "#
    ))
}

/// Headless Chromium rendering transport.
pub struct BrowserTransport {
    config: BrowserEngineConfig,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl BrowserTransport {
    /// Create a transport. The browser starts lazily on the first render.
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    async fn ensure_browser(&self) -> Result<Arc<Browser>, TransportError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let (browser, mut handler) = match self.config.remote_url.clone() {
            Some(remote) => Self::connect_remote(&remote).await?,
            None => self.launch().await?,
        };

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let browser = Arc::new(browser);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    async fn launch(&self) -> Result<(Browser, Handler), TransportError> {
        info!("Launching browser (headless={})", self.config.headless);
        let chrome_path = find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(TransportError::Unavailable)?;
        Browser::launch(config).await.map_err(render_err)
    }

    async fn connect_remote(
        url: &str,
    ) -> Result<(Browser, Handler), TransportError> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let info: serde_json::Value = reqwest::get(&version_url).await?.json().await?;
        let ws_url = info
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TransportError::Unavailable("no webSocketDebuggerUrl in response".to_string())
            })?;

        Browser::connect_with_config(ws_url, HandlerConfig::default())
            .await
            .map_err(render_err)
    }

    async fn prepare(&self, page: &Page, job: &FetchJob) -> Result<(), TransportError> {
        if !job.headers.is_empty() {
            let headers = serde_json::to_value(&job.headers).map_err(render_err)?;
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
                .await
                .map_err(render_err)?;
        }

        if !job.cookies.is_empty() {
            let cookies = job
                .cookies
                .iter()
                .map(|c| {
                    let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                    param.url = Some(job.url.clone());
                    param
                })
                .collect::<Vec<_>>();
            page.set_cookies(cookies).await.map_err(render_err)?;
        }

        let mut nav = NavigateParams::builder().url(job.url.clone());
        if let Some(ref referer) = job.referer {
            nav = nav.referrer(referer.clone());
        }
        let nav = nav.build().map_err(render_err)?;
        page.execute(nav).await.map_err(render_err)?;
        Ok(())
    }

    async fn wait_for_selector(page: &Page, selector: &str) {
        debug!("Waiting for selector: {}", selector);
        while page.find_element(selector).await.is_err() {
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn extract(
        page: &Page,
        job: &FetchJob,
        kind: OutputKind,
        binary: bool,
    ) -> Result<Payload, TransportError> {
        if binary {
            let result: serde_json::Value = page
                .evaluate(binary_fetch_script(&job.url)?)
                .await
                .map_err(render_err)?
                .into_value()
                .map_err(render_err)?;
            if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
                return Err(TransportError::Render(error.to_string()));
            }
            let data = result
                .get("data")
                .and_then(|d| d.as_str())
                .ok_or_else(|| TransportError::Render("empty binary response".to_string()))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(render_err)?;
            return Ok(Payload::Bytes(bytes));
        }

        match kind {
            OutputKind::Json => {
                let text: String = page
                    .evaluate(BODY_TEXT_SCRIPT)
                    .await
                    .map_err(render_err)?
                    .into_value()
                    .map_err(render_err)?;
                Ok(match serde_json::from_str(&text) {
                    Ok(value) => Payload::Json(value),
                    Err(_) => Payload::Text(text),
                })
            }
            OutputKind::Html | OutputKind::String => {
                Ok(Payload::Text(page.content().await.map_err(render_err)?))
            }
        }
    }

    async fn render_on(
        &self,
        page: &Page,
        job: &FetchJob,
        kind: OutputKind,
        binary: bool,
    ) -> Result<Payload, TransportError> {
        self.prepare(page, job).await?;
        if let Some(ref selector) = job.wait_for_selector {
            Self::wait_for_selector(page, selector).await;
        }
        Self::extract(page, job, kind, binary).await
    }
}

#[async_trait]
impl RenderTransport for BrowserTransport {
    async fn render(
        &self,
        job: &FetchJob,
        kind: OutputKind,
        binary: bool,
        timeout: Duration,
    ) -> Result<Payload, TransportError> {
        let browser = self.ensure_browser().await?;
        let page = browser.new_page("about:blank").await.map_err(render_err)?;

        let result = tokio::time::timeout(timeout, self.render_on(&page, job, kind, binary))
            .await
            .unwrap_or_else(|_| {
                warn!("Rendering {} timed out after {:?}", job.url, timeout);
                Err(TransportError::Timeout(timeout.as_millis() as u64))
            });

        let _ = page.close().await;
        result
    }
}
