//! A mirror: one content source and the fetch engine bound to it.
//!
//! [`Mirror`] owns everything private to a source: its in-flight counter,
//! its response cache directory and its persisted options. Fetches take
//! `&self` and may run concurrently; option updates take `&mut self`.

mod image;
mod info;

pub use image::ImageReturn;
pub use info::MirrorInfo;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::NoBrowser;
use crate::cache::ResponseCache;
use crate::config::{Settings, SourceOptions};
use crate::entity::{EmptyLibrary, EntityBuilder, HashIdGenerator, IdGenerator, LibraryStore};
use crate::error::{ConfigError, FetchError};
use crate::file_server::FileServer;
use crate::http_client::HttpClient;
use crate::rate_limit::InFlightLimiter;
use crate::transport::{FallbackChain, FetchJob, HttpTransport, OutputKind, Payload, RenderTransport};

/// Result of [`Mirror::fetch`], tagged by the requested kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Markup, ready for [`FetchResult::document`].
    Html(String),
    Json(Value),
    Text(String),
}

impl FetchResult {
    /// Parse markup into a tree. Structured results cannot become markup.
    pub fn document(&self) -> Result<Html, FetchError> {
        match self {
            Self::Html(markup) | Self::Text(markup) => Ok(Html::parse_document(markup)),
            Self::Json(_) => Err(FetchError::CantParseJsonToHtml),
        }
    }
}

/// Coerce a transport payload into the requested kind.
fn coerce(payload: Payload, kind: OutputKind) -> Result<FetchResult, FetchError> {
    match (kind, payload) {
        (OutputKind::Html, Payload::Text(text)) => Ok(FetchResult::Html(text)),
        (OutputKind::Html, Payload::Bytes(bytes)) => {
            Ok(FetchResult::Html(String::from_utf8_lossy(&bytes).into_owned()))
        }
        (OutputKind::Html, Payload::Json(_)) => Err(FetchError::CantParseJsonToHtml),

        (OutputKind::Json, Payload::Json(value)) => Ok(FetchResult::Json(value)),
        (OutputKind::Json, Payload::Text(text)) => serde_json::from_str(&text)
            .map(FetchResult::Json)
            .map_err(|_| FetchError::InvalidJson),
        (OutputKind::Json, Payload::Bytes(bytes)) => serde_json::from_slice(&bytes)
            .map(FetchResult::Json)
            .map_err(|_| FetchError::InvalidJson),

        (OutputKind::String, Payload::Text(text)) => Ok(FetchResult::Text(text)),
        (OutputKind::String, Payload::Json(value)) => Ok(FetchResult::Text(value.to_string())),
        (OutputKind::String, Payload::Bytes(bytes)) => {
            Ok(FetchResult::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

/// Builder for [`Mirror`].
pub struct MirrorBuilder {
    info: MirrorInfo,
    settings: Settings,
    files: Option<FileServer>,
    direct: Option<Arc<dyn HttpTransport>>,
    render: Option<Arc<dyn RenderTransport>>,
    store: Option<Arc<dyn LibraryStore>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl MirrorBuilder {
    /// File server for page images. Without one, `ImageReturn::Page` downloads yield `None`.
    pub fn file_server(mut self, files: FileServer) -> Self {
        self.files = Some(files);
        self
    }

    /// Direct transport. Defaults to an [`HttpClient`] for the mirror's host.
    pub fn direct(mut self, direct: Arc<dyn HttpTransport>) -> Self {
        self.direct = Some(direct);
        self
    }

    /// Rendering transport. Defaults to [`NoBrowser`].
    pub fn render(mut self, render: Arc<dyn RenderTransport>) -> Self {
        self.render = Some(render);
        self
    }

    /// Library used for identity lookups. Defaults to [`EmptyLibrary`].
    pub fn library(mut self, store: Arc<dyn LibraryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Identifier generator. Defaults to [`HashIdGenerator`].
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Build the mirror, loading (or creating) its options file.
    pub fn build(self) -> Result<Mirror, ConfigError> {
        let root = self.settings.ensure_root()?;
        debug!("Building mirror {} under {}", self.info.name, root.display());

        let options_path = self.settings.options_path(&self.info.name);
        let options = SourceOptions::load(&options_path)?;

        let direct: Arc<dyn HttpTransport> = match self.direct {
            Some(direct) => direct,
            None => Arc::new(
                HttpClient::builder(&self.info.name, &self.settings.user_agent)
                    .default_referer(format!("{}/", self.info.host))
                    .build()?,
            ),
        };
        let store: Arc<dyn LibraryStore> = match self.store {
            Some(store) => store,
            None => Arc::new(EmptyLibrary),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(HashIdGenerator),
        };
        let render: Arc<dyn RenderTransport> = match self.render {
            Some(render) => render,
            None => Arc::new(NoBrowser),
        };

        Ok(Mirror {
            limiter: InFlightLimiter::new(&self.info.name, self.info.wait_time()),
            cache: ResponseCache::new(self.settings.cache_dir(&self.info.name)),
            entities: EntityBuilder::new(&self.info.name, store, ids),
            direct,
            render,
            files: self.files,
            options,
            options_path,
            global_cache: self.settings.cache_enabled,
            direct_timeout: self.settings.direct_timeout,
            render_timeout: self.settings.render_timeout,
            info: self.info,
        })
    }
}

/// One content source with its fetch engine.
pub struct Mirror {
    info: MirrorInfo,
    options: SourceOptions,
    options_path: PathBuf,
    global_cache: bool,
    direct_timeout: Duration,
    render_timeout: Duration,
    limiter: InFlightLimiter,
    cache: ResponseCache,
    direct: Arc<dyn HttpTransport>,
    render: Arc<dyn RenderTransport>,
    files: Option<FileServer>,
    entities: EntityBuilder,
}

impl Mirror {
    pub fn builder(info: MirrorInfo, settings: Settings) -> MirrorBuilder {
        MirrorBuilder {
            info,
            settings,
            files: None,
            direct: None,
            render: None,
            store: None,
            ids: None,
        }
    }

    pub fn info(&self) -> &MirrorInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Whether downloaded assets are cached: the source's flag or the global policy.
    pub fn cache_enabled(&self) -> bool {
        self.options.cache || self.global_cache
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &InFlightLimiter {
        &self.limiter
    }

    pub fn entities(&self) -> &EntityBuilder {
        &self.entities
    }

    pub fn file_server(&self) -> Option<&FileServer> {
        self.files.as_ref()
    }

    pub fn is_mirror_url(&self, url: &str) -> bool {
        self.info.is_mirror_url(url)
    }

    /// Set a free-form option and persist it.
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.options.options.insert(key.to_string(), value);
        self.options.save(&self.options_path)
    }

    /// Turn the source's cache on or off and persist it.
    pub fn set_cache(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.options.cache = enabled;
        self.options.save(&self.options_path)
    }

    /// Enable or disable the source and persist it.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.options.enabled = enabled;
        self.options.save(&self.options_path)
    }

    fn chain(&self) -> FallbackChain<'_> {
        FallbackChain::new(
            self.direct.as_ref(),
            self.render.as_ref(),
            self.direct_timeout,
            self.render_timeout,
        )
    }

    /// Fill in the mirror's host as referer when the job has none.
    fn prepare(&self, job: &FetchJob) -> FetchJob {
        let mut job = job.clone();
        if job.referer.is_none() {
            job.referer = Some(format!("{}/", self.info.host));
        }
        job
    }

    /// Fetch `job` and coerce the body into `kind`.
    pub async fn fetch(&self, job: &FetchJob, kind: OutputKind) -> Result<FetchResult, FetchError> {
        let _guard = self.limiter.acquire().await;
        let job = self.prepare(job);
        let fetched = self.chain().fetch(&job, kind, false).await?;
        debug!(
            "{}: fetched {} ({} bytes, {:?})",
            self.info.name,
            job.url,
            fetched.payload.len(),
            fetched.via
        );
        coerce(fetched.payload, kind)
    }

    /// Fetch with a textual kind name; unknown names fail with `unknown_type`.
    pub async fn fetch_kind(&self, job: &FetchJob, kind: &str) -> Result<FetchResult, FetchError> {
        let kind: OutputKind = kind.parse()?;
        self.fetch(job, kind).await
    }

    /// Fetch a page as a parsed markup tree.
    pub async fn fetch_html(&self, job: &FetchJob) -> Result<Html, FetchError> {
        self.fetch(job, OutputKind::Html).await?.document()
    }

    /// Fetch structured data and deserialize it into `T`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, job: &FetchJob) -> Result<T, FetchError> {
        match self.fetch(job, OutputKind::Json).await? {
            FetchResult::Json(value) => {
                serde_json::from_value(value).map_err(|_| FetchError::InvalidJson)
            }
            other => Err(FetchError::Unknown(format!("unexpected result {:?}", other))),
        }
    }

    /// Fetch a body as raw text. Structured bodies are re-serialized.
    pub async fn fetch_string(&self, job: &FetchJob) -> Result<String, FetchError> {
        match self.fetch(job, OutputKind::String).await? {
            FetchResult::Text(text) => Ok(text),
            other => Err(FetchError::Unknown(format!("unexpected result {:?}", other))),
        }
    }

    /// POST a JSON body. Failures are logged and yield `T::default()`.
    pub async fn post<T>(&self, url: &str, body: &Value, headers: &HashMap<String, String>) -> T
    where
        T: DeserializeOwned + Default,
    {
        let _guard = self.limiter.acquire().await;

        let mut headers = headers.clone();
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
            headers.insert("Referer".to_string(), format!("{}/", self.info.host));
        }

        let payload = match self.direct.post(url, body, &headers, self.direct_timeout).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}: POST {} failed: {}", self.info.name, url, e);
                return T::default();
            }
        };

        let parsed = match payload {
            Payload::Json(value) => serde_json::from_value(value),
            Payload::Text(text) => serde_json::from_str(&text),
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes),
        };
        parsed.unwrap_or_else(|e| {
            warn!("{}: POST {} returned unusable body: {}", self.info.name, url, e);
            T::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{FakeHttp, FakeRender};
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    pub(super) async fn mirror_with(
        direct: Arc<FakeHttp>,
        render: Arc<FakeRender>,
    ) -> (Mirror, TempDir) {
        let dir = tempdir().unwrap();
        let settings = Settings::with_user_data(dir.path());
        let files = FileServer::open(settings.served_dir("files")).await.unwrap();
        let mut info = MirrorInfo::new("demo", "https://demo.example");
        info.wait_time_ms = 0;
        let mirror = Mirror::builder(info, settings)
            .file_server(files)
            .direct(direct)
            .render(render)
            .build()
            .unwrap();
        (mirror, dir)
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Reply {
        ok: bool,
    }

    #[test]
    fn test_coerce_matrix() {
        assert_eq!(
            coerce(Payload::Json(json!({"a": 1})), OutputKind::String).unwrap(),
            FetchResult::Text(r#"{"a":1}"#.to_string())
        );
        assert!(matches!(
            coerce(Payload::Json(json!({})), OutputKind::Html),
            Err(FetchError::CantParseJsonToHtml)
        ));
        assert!(matches!(
            coerce(Payload::Text("nope".to_string()), OutputKind::Json),
            Err(FetchError::InvalidJson)
        ));
        assert_eq!(
            coerce(Payload::Text("[1]".to_string()), OutputKind::Json).unwrap(),
            FetchResult::Json(json!([1]))
        );
    }

    #[tokio::test]
    async fn test_build_writes_default_options() {
        let (mirror, dir) = mirror_with(
            Arc::new(FakeHttp::failing()),
            Arc::new(FakeRender::failing()),
        )
        .await;
        assert!(dir.path().join(".options").join("demo.json").exists());
        assert!(mirror.is_enabled());
        assert!(!mirror.cache_enabled());
    }

    #[tokio::test]
    async fn test_fetch_html_parses_markup() {
        let (mirror, _dir) = mirror_with(
            Arc::new(FakeHttp::text("<h1 class=\"title\">One</h1>")),
            Arc::new(FakeRender::failing()),
        )
        .await;

        let document = mirror.fetch_html(&FetchJob::new("https://demo.example/m/1")).await.unwrap();
        let selector = scraper::Selector::parse("h1.title").unwrap();
        let title: String = document.select(&selector).flat_map(|e| e.text()).collect();
        assert_eq!(title, "One");
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_json_vs_string_on_non_json_body() {
        let direct = Arc::new(FakeHttp::text("<html>not json</html>"));
        let (mirror, _dir) = mirror_with(direct, Arc::new(FakeRender::failing())).await;
        let job = FetchJob::new("https://demo.example/api");

        let err = mirror.fetch_json::<Value>(&job).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidJson));

        let text = mirror.fetch_string(&job).await.unwrap();
        assert_eq!(text, "<html>not json</html>");
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fetch_json_deserializes() {
        let (mirror, _dir) = mirror_with(
            Arc::new(FakeHttp::json(json!({"ok": true}))),
            Arc::new(FakeRender::failing()),
        )
        .await;
        let reply: Reply = mirror.fetch_json(&FetchJob::new("https://demo.example/api")).await.unwrap();
        assert_eq!(reply, Reply { ok: true });
    }

    #[tokio::test]
    async fn test_both_transports_failing_is_no_response() {
        let (mirror, _dir) = mirror_with(
            Arc::new(FakeHttp::failing()),
            Arc::new(FakeRender::failing()),
        )
        .await;
        let err = mirror
            .fetch_string(&FetchJob::new("https://demo.example/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoResponse));
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let direct = Arc::new(FakeHttp::text("x"));
        let (mirror, _dir) = mirror_with(direct.clone(), Arc::new(FakeRender::failing())).await;
        let err = mirror
            .fetch_kind(&FetchJob::new("https://demo.example/x"), "xml")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown_type: xml");
        assert_eq!(direct.calls(), 0);
    }

    #[tokio::test]
    async fn test_post_swallows_failures() {
        let (mirror, _dir) = mirror_with(
            Arc::new(FakeHttp::failing()),
            Arc::new(FakeRender::failing()),
        )
        .await;
        let reply: Reply = mirror
            .post("https://demo.example/api", &json!({"q": 1}), &HashMap::new())
            .await;
        assert_eq!(reply, Reply::default());
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_post_parses_reply() {
        let (mirror, _dir) = mirror_with(
            Arc::new(FakeHttp::json(json!({"ok": true}))),
            Arc::new(FakeRender::failing()),
        )
        .await;
        let reply: Reply = mirror
            .post("https://demo.example/api", &json!({}), &HashMap::new())
            .await;
        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_setters_persist() {
        let (mut mirror, dir) = mirror_with(
            Arc::new(FakeHttp::failing()),
            Arc::new(FakeRender::failing()),
        )
        .await;
        mirror.set_cache(true).unwrap();
        mirror.set_enabled(false).unwrap();
        mirror.set_option("lang", json!("fr")).unwrap();

        let saved = SourceOptions::load(&dir.path().join(".options").join("demo.json")).unwrap();
        assert!(saved.cache);
        assert!(!saved.enabled);
        assert_eq!(saved.get("lang"), Some(&json!("fr")));
        assert!(mirror.cache_enabled());
    }
}
