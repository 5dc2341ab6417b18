use anyhow::{Context, Result};
use serde::Serialize;
use sitesearch_core::Store;
use sitesearch_crawler::CrawlerConfig;

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub result: bool,
    pub statistics: Statistics,
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

#[derive(Debug, Default, Serialize)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub indexing: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: String,
    /// Unix milliseconds of the last status change, 0 if never crawled.
    pub status_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pages: usize,
    pub lemmas: usize,
}

/// Counts for every configured site, read from the store.
pub fn collect(config: &CrawlerConfig, store: &dyn Store, indexing: bool) -> Result<StatisticsResponse> {
    let mut total = TotalStatistics { sites: config.sites.len(), indexing, ..TotalStatistics::default() };
    let mut detailed = Vec::with_capacity(config.sites.len());

    for configured in &config.sites {
        let root = configured.root_url();
        let item = match store.find_site_by_url(root).with_context(|| format!("looking up {root}"))? {
            Some(site) => {
                let pages = store.count_pages(site.id).context("counting pages")?;
                let lemmas = store.count_lemmas(site.id).context("counting lemmas")?;
                SiteStatistics {
                    url: site.url,
                    name: site.name,
                    status: site.status.to_string(),
                    status_time: (site.status_time.unix_timestamp_nanos() / 1_000_000) as i64,
                    error: site.last_error,
                    pages,
                    lemmas,
                }
            }
            None => SiteStatistics {
                url: root.to_string(),
                name: configured.name.clone(),
                status: "NOT_INDEXED".to_string(),
                status_time: 0,
                error: None,
                pages: 0,
                lemmas: 0,
            },
        };
        total.pages += item.pages;
        total.lemmas += item.lemmas;
        detailed.push(item);
    }

    Ok(StatisticsResponse { result: true, statistics: Statistics { total, detailed } })
}
