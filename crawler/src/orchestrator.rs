use crate::config::{CrawlerConfig, SiteConfig};
use crate::fetch::{FetchError, Fetcher, HttpFetcher};
use crate::scheduler::{CrawlContext, CrawlScheduler, TaskOutcome};
use crate::scope::{Scope, ScopeFilter};
use anyhow::Context;
use parking_lot::Mutex;
use sitesearch_core::{SiteStatus, Store};
use sitesearch_indexer::IndexWriter;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const STOPPED_BY_USER: &str = "stopped by user";
pub const START_PAGE_UNAVAILABLE: &str = "site root page is unavailable";
const START_PAGE_NOT_STORED: &str = "site root page could not be stored";
const START_PAGE_NOT_CRAWLED: &str = "start page was not crawled";
pub const CRAWL_TIMED_OUT: &str = "crawl timed out";
pub const SITE_TASK_DIED: &str = "site crawl task died";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("indexing is already running")]
    AlreadyRunning,
    #[error("indexing is not running")]
    NotRunning,
    #[error("{0} is outside the configured sites")]
    UnknownSite(String),
    #[error("{url} cannot be crawled: {reason}")]
    OutOfScope { url: String, reason: &'static str },
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    config: CrawlerConfig,
    writer: Arc<IndexWriter>,
    fetcher: Arc<dyn Fetcher>,
    in_progress: AtomicBool,
    next_run: AtomicU64,
    run: Mutex<Option<ActiveRun>>,
}

/// Owns indexing runs: at most one at a time, each with its own
/// cancellation token threaded through every site crawl.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: CrawlerConfig, store: Arc<dyn Store>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                writer: Arc::new(IndexWriter::new(store)),
                fetcher,
                in_progress: AtomicBool::new(false),
                next_run: AtomicU64::new(1),
                run: Mutex::new(None),
            }),
        }
    }

    /// Orchestrator fetching over HTTP with the configured client settings.
    pub fn with_http(config: CrawlerConfig, store: Arc<dyn Store>) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(config, store, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.inner.writer.store()
    }

    pub fn is_indexing_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// Starts a background run over every configured site.
    pub fn start(&self) -> Result<(), OrchestratorError> {
        self.begin(|inner, cancel| async move { inner.run_all(cancel).await })?;
        tracing::info!(sites = self.inner.config.sites.len(), "indexing started");
        Ok(())
    }

    /// Cancels the current run and marks every site still crawling as failed.
    /// Crawls get the configured grace period to wind down before they are aborted.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        let Some(run) = self.inner.run.lock().take() else {
            return Err(OrchestratorError::NotRunning);
        };
        tracing::info!(run = run.id, "stopping indexing");
        run.cancel.cancel();
        self.inner.fail_crawling_sites(STOPPED_BY_USER);

        let mut handle = run.handle;
        if tokio::time::timeout(self.inner.config.shutdown_grace(), &mut handle).await.is_err() {
            tracing::warn!(run = run.id, "crawls did not stop in time, aborting");
            handle.abort();
            if let Err(err) = handle.await {
                tracing::debug!(run = run.id, %err, "run aborted");
            }
        }

        self.inner.fail_crawling_sites(STOPPED_BY_USER);
        self.inner.in_progress.store(false, Ordering::SeqCst);
        tracing::info!(run = run.id, "indexing stopped");
        Ok(())
    }

    /// Re-indexes the configured site owning `url`, crawling from `url`.
    pub async fn try_index_single_page(&self, url: &str) -> Result<bool, OrchestratorError> {
        let start = Url::parse(url.trim())
            .map_err(|source| OrchestratorError::InvalidUrl { url: url.to_string(), source })?;
        let site = self
            .inner
            .config
            .site_for_url(start.as_str())
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownSite(url.to_string()))?;
        match ScopeFilter::new(site.root_url()).check(&start) {
            Scope::Internal(_) => {}
            Scope::External => {
                return Err(OrchestratorError::OutOfScope { url: url.to_string(), reason: "external" })
            }
            Scope::Denied(reason) => return Err(OrchestratorError::OutOfScope { url: url.to_string(), reason }),
        }

        let (tx, rx) = oneshot::channel();
        self.begin(move |inner, cancel| async move {
            let indexed = inner.index_site(&site, start, &cancel).await;
            let _ = tx.send(indexed);
        })?;
        Ok(rx.await.unwrap_or(false))
    }

    pub async fn index_single_page(&self, url: &str) -> bool {
        match self.try_index_single_page(url).await {
            Ok(indexed) => indexed,
            Err(err) => {
                tracing::warn!(url, %err, "page indexing rejected");
                false
            }
        }
    }

    fn begin<F, Fut>(&self, work: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(Arc<Inner>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self
            .inner
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrchestratorError::AlreadyRunning);
        }
        let id = self.inner.next_run.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let work = work(Arc::clone(&self.inner), cancel.clone());

        let mut slot = self.inner.run.lock();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            work.await;
            inner.finish(id);
        });
        *slot = Some(ActiveRun { id, cancel, handle });
        Ok(())
    }
}

impl Inner {
    fn store(&self) -> &Arc<dyn Store> {
        self.writer.store()
    }

    /// Clears the run unless `stop` already took it over.
    fn finish(&self, id: u64) {
        let mut slot = self.run.lock();
        if slot.as_ref().map_or(false, |run| run.id == id) {
            *slot = None;
            self.in_progress.store(false, Ordering::SeqCst);
        }
    }

    async fn run_all(self: Arc<Self>, cancel: CancellationToken) {
        let mut sites = JoinSet::new();
        for site in self.config.sites.clone() {
            let start = match Url::parse(site.root_url()) {
                Ok(url) => url,
                Err(err) => {
                    tracing::error!(site = %site.url, %err, "skipping site with invalid url");
                    continue;
                }
            };
            let inner = Arc::clone(&self);
            let cancel = cancel.clone();
            sites.spawn(async move { inner.index_site(&site, start, &cancel).await });
        }
        let total = sites.len();

        let finished = tokio::time::timeout(self.config.crawl_timeout(), async {
            let mut indexed = 0;
            let mut died = 0;
            while let Some(joined) = sites.join_next().await {
                match joined {
                    Ok(true) => indexed += 1,
                    Ok(false) => {}
                    Err(err) => {
                        tracing::error!(%err, "site task aborted");
                        died += 1;
                    }
                }
            }
            // every finished crawl has settled its site, so rows still crawling belong to dead tasks
            if died > 0 {
                self.fail_crawling_sites(SITE_TASK_DIED);
            }
            indexed
        })
        .await;

        match finished {
            Ok(indexed) => tracing::info!(indexed, total, "indexing run finished"),
            Err(_) => {
                tracing::error!(total, "indexing run timed out, aborting crawls");
                sites.abort_all();
                while sites.join_next().await.is_some() {}
                self.fail_crawling_sites(CRAWL_TIMED_OUT);
            }
        }
    }

    /// Runs one site and reports whether it ended up indexed. Failures land
    /// on the site record, never on the caller.
    async fn index_site(&self, site: &SiteConfig, start: Url, cancel: &CancellationToken) -> bool {
        match self.crawl_site(site, start, cancel).await {
            Ok(status) => status == SiteStatus::Indexed,
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(site = %site.root_url(), error = %message, "site indexing failed");
                self.mark_failed(site.root_url(), &message);
                false
            }
        }
    }

    async fn crawl_site(
        &self,
        site: &SiteConfig,
        start: Url,
        cancel: &CancellationToken,
    ) -> anyhow::Result<SiteStatus> {
        let root = site.root_url();
        let store = self.store();
        if let Some(existing) = store.find_site_by_url(root).context("looking up site")? {
            let purged = store.delete_site(existing.id).with_context(|| format!("purging {root}"))?;
            tracing::info!(
                site = %root,
                pages = purged.pages,
                lemmas = purged.lemmas,
                postings = purged.postings,
                "previous index purged"
            );
        }

        let mut record = store.insert_site(root, &site.name).context("creating site")?;
        tracing::info!(site = %root, status = %record.status, start = %start, "site crawl started");

        let ctx = CrawlContext::new(
            record.clone(),
            Arc::clone(&self.writer),
            Arc::clone(&self.fetcher),
            cancel.clone(),
            &self.config,
        );
        let summary = CrawlScheduler::new(ctx, self.config.workers_per_site).run(start).await;

        if cancel.is_cancelled() {
            record.fail(STOPPED_BY_USER);
        } else {
            match summary.start {
                Some(TaskOutcome::FetchError) => record.fail(START_PAGE_UNAVAILABLE),
                Some(TaskOutcome::Failed) => record.fail(START_PAGE_NOT_STORED),
                Some(TaskOutcome::OutOfScope | TaskOutcome::Duplicate | TaskOutcome::Cancelled) | None => {
                    record.fail(START_PAGE_NOT_CRAWLED)
                }
                _ => record.set_status(SiteStatus::Indexed),
            }
        }
        store.update_site(&record).context("saving site status")?;

        match &record.last_error {
            Some(error) => tracing::error!(site = %root, status = %record.status, %error, "site crawl ended"),
            None => tracing::info!(
                site = %root,
                status = %record.status,
                pages = summary.pages_stored(),
                "site crawl ended"
            ),
        }
        Ok(record.status)
    }

    fn mark_failed(&self, root: &str, message: &str) {
        match self.store().find_site_by_url(root) {
            Ok(Some(mut site)) => {
                site.fail(message);
                if let Err(err) = self.store().update_site(&site) {
                    tracing::error!(site = %root, %err, "could not record site failure");
                }
            }
            Ok(None) => {}
            Err(err) => tracing::error!(site = %root, %err, "could not record site failure"),
        }
    }

    fn fail_crawling_sites(&self, reason: &str) {
        let crawling = match self.store().sites_with_status(SiteStatus::Crawling) {
            Ok(sites) => sites,
            Err(err) => {
                tracing::error!(%err, "listing crawling sites failed");
                return;
            }
        };
        for mut site in crawling {
            site.fail(reason);
            match self.store().update_site(&site) {
                Ok(()) => tracing::info!(site = %site.url, reason, "site marked failed"),
                Err(err) => tracing::error!(site = %site.url, %err, "could not mark site failed"),
            }
        }
    }
}
