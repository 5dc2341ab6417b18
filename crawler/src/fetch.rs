use crate::config::CrawlerConfig;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{header, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl FetchError {
    /// HTTP status carried by the error, 0 when the request never got one.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Transport(err) => err.status().map_or(0, |s| s.as_u16()),
            FetchError::TooLarge { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Binary,
    Other,
}

impl ContentKind {
    pub fn of(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else { return ContentKind::Other };
        let ct = ct.trim().to_ascii_lowercase();
        if ct.contains("text/html") || ct.contains("application/xhtml+xml") {
            ContentKind::Html
        } else if ["image/", "audio/", "video/", "font/"].iter().any(|p| ct.starts_with(p))
            || ct.starts_with("application/pdf")
            || ct.starts_with("application/octet-stream")
            || ct.starts_with("application/zip")
        {
            ContentKind::Binary
        } else {
            ContentKind::Other
        }
    }
}

/// One fetched response. `body` is only read for HTML.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::of(self.content_type.as_deref())
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher with a fixed user agent and referrer.
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        if let Ok(referrer) = header::HeaderValue::from_str(&config.referrer) {
            headers.insert(header::REFERER, referrer);
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, max_body_bytes: config.max_body_bytes })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut resp = self.client.get(url.clone()).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut page = FetchedPage { url: resp.url().clone(), status, content_type, body: None };
        if !resp.status().is_success() || page.kind() != ContentKind::Html {
            return Ok(page);
        }
        if resp.content_length().map_or(false, |len| len as usize > self.max_body_bytes) {
            return Err(FetchError::TooLarge { limit: self.max_body_bytes });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if bytes.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge { limit: self.max_body_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }
        page.body = Some(String::from_utf8_lossy(&bytes).into_owned());
        Ok(page)
    }
}

/// Random pause in `[min_ms, max_ms)`; `min_ms` when the range is empty.
pub fn politeness_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
}
