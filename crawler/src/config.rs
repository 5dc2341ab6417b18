use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// A configured site: display name and root URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
}

impl SiteConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }

    /// Root URL without a trailing slash, as stored and prefix-matched.
    pub fn root_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub sites: Vec<SiteConfig>,
    pub user_agent: String,
    pub referrer: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Politeness delay before each fetch is drawn from [min, max) milliseconds.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub workers_per_site: usize,
    pub max_body_bytes: usize,
    /// Overall wait for a full run before its crawls are aborted.
    pub crawl_timeout_secs: u64,
    /// How long `stop` waits for crawls to wind down before aborting them.
    pub shutdown_grace_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            user_agent: "Mozilla/5.0 (Windows; U; WindowsNT 5.1; en-US; rv1.8.1.6) Gecko/20070725 Firefox/2.0.0.6"
                .to_string(),
            referrer: "http://www.google.com".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            min_delay_ms: 6,
            max_delay_ms: 72,
            workers_per_site: 8,
            max_body_bytes: 2 * 1024 * 1024,
            crawl_timeout_secs: 60 * 60,
            shutdown_grace_secs: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: CrawlerConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers_per_site == 0 {
            bail!("workers_per_site must be greater than 0");
        }
        if self.min_delay_ms > self.max_delay_ms {
            bail!("min_delay_ms ({}) exceeds max_delay_ms ({})", self.min_delay_ms, self.max_delay_ms);
        }
        for site in &self.sites {
            let url = Url::parse(site.root_url()).with_context(|| format!("site {:?} has an invalid url", site.name))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("site {:?} must use http or https", site.name);
            }
        }
        Ok(())
    }

    /// The configured site whose root is a prefix of `url`.
    pub fn site_for_url(&self, url: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| crate::scope::within_root(url, site.root_url()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
