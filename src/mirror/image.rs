//! Image download path: cache, fetch, validate, then inline or serve.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use super::Mirror;
use crate::cache::cache_key;
use crate::error::FetchError;
use crate::file_server::DEFAULT_LIFETIME;
use crate::transport::{FetchJob, OutputKind, Payload};
use crate::utils::{detect_content_type, extension_for, is_image};

/// How a downloaded image is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageReturn {
    /// Inline `data:` URI.
    Cover,
    /// Path on the ephemeral file server.
    Page,
}

impl FromStr for ImageReturn {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cover" => Ok(Self::Cover),
            "page" => Ok(Self::Page),
            other => Err(FetchError::UnknownType(other.to_string())),
        }
    }
}

impl Mirror {
    /// Download an image.
    ///
    /// The response cache is consulted first when caching is on, and a hit
    /// never touches a transport. Bodies that are not images yield `None`.
    /// `config` carries the headers, cookies and timeout the source needs for
    /// image requests; its url and selector are ignored.
    pub async fn download_image(
        &self,
        url: &str,
        ret: ImageReturn,
        referer: Option<&str>,
        depends_on_params: bool,
        config: Option<&FetchJob>,
    ) -> Option<String> {
        // Counted from the start so cache hits are released like any other request.
        let guard = self.limiter.register();
        let key = cache_key(url, depends_on_params);
        let caching = self.cache_enabled();

        if caching {
            if let Some(asset) = self.cache.get_with_type(&key, Some(url)).await {
                match asset.content_type {
                    Some(content_type) if is_image(&content_type) => {
                        debug!("{}: image cache hit for {}", self.info.name, url);
                        return self.hand_back(ret, &key, asset.data, &content_type).await;
                    }
                    _ => debug!("{}: cached entry for {} is not an image, refetching", self.info.name, url),
                }
            }
        }

        self.limiter.throttle(&guard).await;

        let job = image_job(url, referer, config, &self.info.host);

        let fetched = match self.chain().fetch(&job, OutputKind::String, true).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("{}: image {} failed: {}", self.info.name, url, e);
                return None;
            }
        };

        let data = match fetched.payload {
            Payload::Bytes(data) => data,
            Payload::Text(text) => text.into_bytes(),
            Payload::Json(_) => {
                warn!("{}: image {} came back as JSON", self.info.name, url);
                return None;
            }
        };

        let content_type = detect_content_type(&data, fetched.content_type.as_deref(), Some(url));
        let content_type = match content_type {
            Some(ct) if is_image(&ct) => ct,
            other => {
                warn!(
                    "{}: {} is not an image ({})",
                    self.info.name,
                    url,
                    other.as_deref().unwrap_or("unknown type")
                );
                return None;
            }
        };

        if caching {
            if let Err(e) = self.cache.put(&key, &data).await {
                warn!("{}: failed to cache {}: {}", self.info.name, url, e);
            }
        }

        let result = self.hand_back(ret, &key, data, &content_type).await;
        drop(guard);
        result
    }

    async fn hand_back(
        &self,
        ret: ImageReturn,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Option<String> {
        match ret {
            ImageReturn::Cover => Some(format!(
                "data:{};base64,{}",
                content_type,
                STANDARD.encode(&data)
            )),
            ImageReturn::Page => {
                let Some(files) = &self.files else {
                    warn!("{}: no file server to serve page images", self.info.name);
                    return None;
                };
                let filename = format!(
                    "{}-{}.{}",
                    self.info.name,
                    key,
                    extension_for(&data, content_type)
                );
                Some(files.serve(&data, &filename, DEFAULT_LIFETIME).await)
            }
        }
    }
}

/// Job for an image request: the caller's headers, cookies and timeout on
/// the image url. The explicit referer wins over the config's, then the host.
fn image_job(url: &str, referer: Option<&str>, config: Option<&FetchJob>, host: &str) -> FetchJob {
    let mut job = config.cloned().unwrap_or_default();
    job.url = url.to_string();
    job.wait_for_selector = None;
    job.referer = referer
        .map(str::to_string)
        .or(job.referer)
        .or_else(|| Some(format!("{}/", host)));
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::tests::mirror_with;
    use crate::transport::testing::{png_bytes, FakeHttp, FakeRender};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_image_return_from_str() {
        assert_eq!("cover".parse::<ImageReturn>().unwrap(), ImageReturn::Cover);
        assert_eq!("page".parse::<ImageReturn>().unwrap(), ImageReturn::Page);
        assert!("poster".parse::<ImageReturn>().is_err());
    }

    #[tokio::test]
    async fn test_cover_is_data_uri() {
        let direct = Arc::new(FakeHttp::bytes("image/png", png_bytes()));
        let (mirror, _dir) = mirror_with(direct, Arc::new(FakeRender::failing())).await;

        let uri = mirror
            .download_image("https://demo.example/c.png", ImageReturn::Cover, None, false, None)
            .await
            .unwrap();

        assert_eq!(uri, format!("data:image/png;base64,{}", STANDARD.encode(png_bytes())));
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_page_is_served() {
        let direct = Arc::new(FakeHttp::bytes("image/png", png_bytes()));
        let (mirror, _dir) = mirror_with(direct, Arc::new(FakeRender::failing())).await;

        let path = mirror
            .download_image("https://demo.example/p/1.png", ImageReturn::Page, None, false, None)
            .await
            .unwrap();

        assert!(path.starts_with("/files/demo-"));
        assert!(path.ends_with(".png"));
        let filename = path.trim_start_matches("/files/");
        assert_eq!(
            std::fs::read(mirror.file_server().unwrap().dir().join(filename)).unwrap(),
            png_bytes()
        );
    }

    #[tokio::test]
    async fn test_non_image_is_rejected() {
        let direct = Arc::new(FakeHttp::bytes("text/html", b"<html>blocked</html>".to_vec()));
        let (mirror, _dir) = mirror_with(direct, Arc::new(FakeRender::failing())).await;

        let result = mirror
            .download_image("https://demo.example/p/1", ImageReturn::Cover, None, false, None)
            .await;
        assert_eq!(result, None);
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_transports() {
        let direct = Arc::new(FakeHttp::bytes("image/png", png_bytes()));
        let render = Arc::new(FakeRender::failing());
        let (mut mirror, _dir) = mirror_with(direct.clone(), render.clone()).await;
        mirror.set_cache(true).unwrap();

        let url = "https://demo.example/c.png?token=1";
        let first = mirror.download_image(url, ImageReturn::Cover, None, false, None).await;
        assert_eq!(direct.calls(), 1);

        let second = mirror
            .download_image("https://demo.example/c.png?token=2", ImageReturn::Cover, None, false, None)
            .await;
        assert_eq!(first, second);
        assert_eq!(direct.calls(), 1);
        assert_eq!(render.calls(), 0);
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cache_disabled_does_not_persist() {
        let direct = Arc::new(FakeHttp::bytes("image/png", png_bytes()));
        let (mirror, _dir) = mirror_with(direct.clone(), Arc::new(FakeRender::failing())).await;

        mirror.download_image("https://demo.example/c.png", ImageReturn::Cover, None, false, None).await;
        mirror.download_image("https://demo.example/c.png", ImageReturn::Cover, None, false, None).await;

        assert_eq!(direct.calls(), 2);
        assert_eq!(mirror.cache().disk_usage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_svg_cache_hit_skips_transports() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"/>"#.to_vec();
        let direct = Arc::new(FakeHttp::bytes("image/svg+xml", svg));
        let (mut mirror, _dir) = mirror_with(direct.clone(), Arc::new(FakeRender::failing())).await;
        mirror.set_cache(true).unwrap();

        let url = "https://demo.example/c.svg";
        let first = mirror.download_image(url, ImageReturn::Cover, None, false, None).await;
        let second = mirror.download_image(url, ImageReturn::Cover, None, false, None).await;

        assert!(first.as_deref().unwrap().starts_with("data:image/svg+xml;base64,"));
        assert_eq!(first, second);
        assert_eq!(direct.calls(), 1);
    }

    #[tokio::test]
    async fn test_config_headers_and_cookies_reach_transport() {
        let direct = Arc::new(FakeHttp::bytes("image/png", png_bytes()));
        let (mirror, _dir) = mirror_with(direct.clone(), Arc::new(FakeRender::failing())).await;
        let config = FetchJob::new("https://ignored.example/")
            .cookie("session", "abc")
            .header("X-Requested-With", "mirror")
            .wait_for("div.reader")
            .timeout(Duration::from_secs(2));

        mirror
            .download_image(
                "https://demo.example/c.png",
                ImageReturn::Cover,
                None,
                false,
                Some(&config),
            )
            .await
            .unwrap();

        let job = direct.last_job().unwrap();
        assert_eq!(job.url, "https://demo.example/c.png");
        assert_eq!(job.cookie_header().as_deref(), Some("session=abc"));
        assert_eq!(job.headers.get("X-Requested-With").map(String::as_str), Some("mirror"));
        assert_eq!(job.wait_for_selector, None);
        assert_eq!(job.referer.as_deref(), Some("https://demo.example/"));
        assert_eq!(direct.last_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_image_job_referer_precedence() {
        let config = FetchJob::new("x").referer("https://config.example/");
        let host = "https://demo.example";

        let explicit = image_job("https://demo.example/a.png", Some("https://r.example/"), Some(&config), host);
        assert_eq!(explicit.referer.as_deref(), Some("https://r.example/"));

        let from_config = image_job("https://demo.example/a.png", None, Some(&config), host);
        assert_eq!(from_config.referer.as_deref(), Some("https://config.example/"));

        let default = image_job("https://demo.example/a.png", None, None, host);
        assert_eq!(default.referer.as_deref(), Some("https://demo.example/"));
    }

    #[tokio::test]
    async fn test_page_without_file_server_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = crate::mirror::MirrorInfo::new("demo", "https://demo.example");
        info.wait_time_ms = 0;
        let mirror = Mirror::builder(info, crate::config::Settings::with_user_data(dir.path()))
            .direct(Arc::new(FakeHttp::bytes("image/png", png_bytes())))
            .render(Arc::new(FakeRender::failing()))
            .build()
            .unwrap();

        let page = mirror
            .download_image("https://demo.example/p.png", ImageReturn::Page, None, false, None)
            .await;
        assert_eq!(page, None);
        assert_eq!(mirror.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_render_fallback_for_images() {
        let render = Arc::new(FakeRender::bytes(png_bytes()));
        let (mirror, _dir) = mirror_with(Arc::new(FakeHttp::failing()), render.clone()).await;

        let uri = mirror
            .download_image("https://demo.example/c", ImageReturn::Cover, None, false, None)
            .await
            .unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(render.calls(), 1);
    }
}
