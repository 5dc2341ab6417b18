use crate::config::CrawlerConfig;
use crate::fetch::{politeness_delay, ContentKind, FetchedPage, Fetcher};
use crate::scope::{is_denied_href, Scope, ScopeFilter};
use crate::visited::VisitedSet;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use sitesearch_core::{plain_text_frequencies, NewPage, Site, Store};
use sitesearch_indexer::IndexWriter;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

lazy_static! {
    static ref SEL_TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref SEL_BODY: Selector = Selector::parse("body").expect("valid selector");
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// Terminal state of one page task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    OutOfScope,
    Duplicate,
    Cancelled,
    FetchError,
    NonHtmlStored,
    Indexed,
    /// The page could not be stored or indexed.
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub indexed: usize,
    pub non_html: usize,
    pub fetch_errors: usize,
    pub duplicates: usize,
    pub out_of_scope: usize,
    pub cancelled: usize,
    pub failed: usize,
    /// Outcome of the task the crawl started from.
    pub start: Option<TaskOutcome>,
}

impl CrawlSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        if self.start.is_none() {
            self.start = Some(outcome);
        }
        match outcome {
            TaskOutcome::OutOfScope => self.out_of_scope += 1,
            TaskOutcome::Duplicate => self.duplicates += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
            TaskOutcome::FetchError => self.fetch_errors += 1,
            TaskOutcome::NonHtmlStored => self.non_html += 1,
            TaskOutcome::Indexed => self.indexed += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }

    /// Pages written to the store, placeholders included.
    pub fn pages_stored(&self) -> usize {
        self.indexed + self.non_html + self.fetch_errors
    }
}

/// Shared state of one site crawl.
pub struct CrawlContext {
    pub site: Site,
    pub scope: ScopeFilter,
    pub visited: VisitedSet,
    queued: VisitedSet,
    pub store: Arc<dyn Store>,
    pub writer: Arc<IndexWriter>,
    pub fetcher: Arc<dyn Fetcher>,
    pub cancel: CancellationToken,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl CrawlContext {
    pub fn new(
        site: Site,
        writer: Arc<IndexWriter>,
        fetcher: Arc<dyn Fetcher>,
        cancel: CancellationToken,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            scope: ScopeFilter::new(&site.url),
            site,
            visited: VisitedSet::new(),
            queued: VisitedSet::new(),
            store: Arc::clone(writer.store()),
            writer,
            fetcher,
            cancel,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

/// Fork-join crawl of one site over a bounded set of in-flight page tasks.
///
/// Each finished task hands back the links it discovered; they join the
/// frontier and the run only completes once the frontier is empty and
/// every task has returned, so the whole reachable tree is waited for.
pub struct CrawlScheduler {
    ctx: Arc<CrawlContext>,
    workers: usize,
}

impl CrawlScheduler {
    pub fn new(ctx: CrawlContext, workers: usize) -> Self {
        Self { ctx: Arc::new(ctx), workers: workers.max(1) }
    }

    pub fn context(&self) -> &CrawlContext {
        &self.ctx
    }

    pub async fn run(&self, start: Url) -> CrawlSummary {
        let ctx = &self.ctx;
        let mut summary = CrawlSummary::default();
        if let Scope::Internal(key) = ctx.scope.check(&start) {
            ctx.queued.insert_if_absent(&key);
        }
        let mut frontier = VecDeque::from([start]);
        let mut inflight: JoinSet<(TaskOutcome, Vec<Url>)> = JoinSet::new();

        loop {
            if ctx.cancel.is_cancelled() && !frontier.is_empty() {
                for _ in frontier.drain(..) {
                    summary.record(TaskOutcome::Cancelled);
                }
            }
            while inflight.len() < self.workers {
                let Some(url) = frontier.pop_front() else { break };
                let ctx = Arc::clone(ctx);
                inflight.spawn(async move { crawl_page(&ctx, url).await });
            }

            let Some(joined) = inflight.join_next().await else { break };
            match joined {
                Ok((outcome, links)) => {
                    summary.record(outcome);
                    frontier.extend(links);
                    if outcome == TaskOutcome::Indexed && summary.indexed % 100 == 0 {
                        tracing::info!(
                            site = %ctx.site.url,
                            indexed = summary.indexed,
                            visited = ctx.visited.len(),
                            frontier = frontier.len(),
                            "crawl progress"
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(site = %ctx.site.url, %err, "page task aborted");
                    summary.record(TaskOutcome::Failed);
                }
            }
        }

        tracing::info!(
            site = %ctx.site.url,
            indexed = summary.indexed,
            non_html = summary.non_html,
            fetch_errors = summary.fetch_errors,
            duplicates = summary.duplicates,
            cancelled = summary.cancelled,
            failed = summary.failed,
            "crawl finished"
        );
        summary
    }
}

async fn crawl_page(ctx: &CrawlContext, url: Url) -> (TaskOutcome, Vec<Url>) {
    if ctx.cancel.is_cancelled() {
        return (TaskOutcome::Cancelled, Vec::new());
    }
    let path = match ctx.scope.check(&url) {
        Scope::Internal(path) => path,
        Scope::External => return (TaskOutcome::OutOfScope, Vec::new()),
        Scope::Denied(reason) => {
            tracing::debug!(%url, reason, "url denied");
            return (TaskOutcome::OutOfScope, Vec::new());
        }
    };
    if !ctx.visited.insert_if_absent(&path) {
        return (TaskOutcome::Duplicate, Vec::new());
    }

    let delay = politeness_delay(ctx.min_delay_ms, ctx.max_delay_ms);
    tokio::select! {
        _ = ctx.cancel.cancelled() => return (TaskOutcome::Cancelled, Vec::new()),
        _ = tokio::time::sleep(delay) => {}
    }
    if ctx.cancel.is_cancelled() {
        return (TaskOutcome::Cancelled, Vec::new());
    }

    tracing::debug!(%url, "fetching");
    let fetched = match ctx.fetcher.fetch(&url).await {
        Ok(page) => page,
        Err(err) => {
            tracing::warn!(%url, %err, "fetch failed");
            let outcome = store_placeholder(ctx, &path, err.status(), format!("Fetch error: {err}"));
            return (outcome.unwrap_or(TaskOutcome::FetchError), Vec::new());
        }
    };

    if !fetched.is_success() {
        tracing::warn!(%url, status = fetched.status, "unexpected status");
        let outcome = store_placeholder(ctx, &path, fetched.status, format!("HTTP status {}", fetched.status));
        return (outcome.unwrap_or(TaskOutcome::FetchError), Vec::new());
    }

    let content_type = fetched.content_type.clone().unwrap_or_default();
    match fetched.kind() {
        ContentKind::Binary => {
            let outcome = store_placeholder(ctx, &path, fetched.status, format!("Binary content: {content_type}"));
            (outcome.unwrap_or(TaskOutcome::NonHtmlStored), Vec::new())
        }
        ContentKind::Other => {
            let outcome =
                store_placeholder(ctx, &path, fetched.status, format!("Unhandled content type: {content_type}"));
            (outcome.unwrap_or(TaskOutcome::NonHtmlStored), Vec::new())
        }
        ContentKind::Html => index_html(ctx, &path, &fetched),
    }
}

/// Stores a page without text or lemmas. `None` means it was stored.
fn store_placeholder(ctx: &CrawlContext, path: &str, code: u16, content: String) -> Option<TaskOutcome> {
    let page = NewPage { site_id: ctx.site.id, path: path.to_string(), code, title: String::new(), content };
    match ctx.store.insert_page(page) {
        Ok(Some(_)) => None,
        Ok(None) => Some(TaskOutcome::Duplicate),
        Err(err) => {
            tracing::error!(site = %ctx.site.url, path, %err, "storing page failed");
            Some(TaskOutcome::Failed)
        }
    }
}

fn index_html(ctx: &CrawlContext, path: &str, fetched: &FetchedPage) -> (TaskOutcome, Vec<Url>) {
    let parsed = parse_html(fetched.body.as_deref().unwrap_or_default(), &fetched.url);
    let new_page = NewPage {
        site_id: ctx.site.id,
        path: path.to_string(),
        code: fetched.status,
        title: parsed.title,
        content: parsed.text,
    };
    let page = match ctx.store.insert_page(new_page) {
        Ok(Some(page)) => page,
        Ok(None) => {
            tracing::debug!(path, "page already stored");
            return (TaskOutcome::Duplicate, Vec::new());
        }
        Err(err) => {
            tracing::error!(site = %ctx.site.url, path, %err, "storing page failed");
            return (TaskOutcome::Failed, Vec::new());
        }
    };

    let frequencies = plain_text_frequencies(&page.content);
    if let Err(err) = ctx.writer.write_index(&page, &frequencies) {
        tracing::error!(site = %ctx.site.url, path, "indexing failed: {err:#}");
        return (TaskOutcome::Failed, Vec::new());
    }
    tracing::info!(site = %ctx.site.url, path, lemmas = frequencies.len(), "page indexed");

    (TaskOutcome::Indexed, expand_links(ctx, parsed.links))
}

/// Children worth crawling: in scope and neither visited nor already queued.
fn expand_links(ctx: &CrawlContext, links: Vec<Url>) -> Vec<Url> {
    let mut children = Vec::new();
    for link in links {
        if ctx.cancel.is_cancelled() {
            break;
        }
        if let Scope::Internal(key) = ctx.scope.check(&link) {
            if !ctx.visited.contains(&key) && ctx.queued.insert_if_absent(&key) {
                children.push(link);
            }
        }
    }
    children
}

struct ParsedHtml {
    title: String,
    text: String,
    links: Vec<Url>,
}

fn parse_html(body: &str, base: &Url) -> ParsedHtml {
    let doc = Html::parse_document(body);
    let title = doc
        .select(&SEL_TITLE)
        .next()
        .map(|n| n.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let text = match doc.select(&SEL_BODY).next() {
        Some(body) => sitesearch_core::tokenizer::visible_text(body),
        None => sitesearch_core::tokenizer::visible_text(doc.root_element()),
    };
    let mut links = Vec::new();
    for a in doc.select(&SEL_A) {
        let Some(href) = a.value().attr("href") else { continue };
        if is_denied_href(href) {
            continue;
        }
        if let Ok(mut url) = base.join(href.trim()) {
            url.set_fragment(None);
            links.push(url);
        }
    }
    ParsedHtml { title, text, links }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_text_and_links() {
        let base = Url::parse("https://cats.example/dir/page").unwrap();
        let parsed = parse_html(
            r#"<html><head><title> Cats
                 Home </title><style>p{}</style></head>
               <body><h1>Cats</h1><p>sleep all day</p>
               <a href="other">rel</a><a href="/abs#frag">abs</a>
               <a href="javascript:void(0)">js</a><a href="mailto:a@b.c">mail</a>
               <script>var cat = 1;</script></body></html>"#,
            &base,
        );
        assert_eq!(parsed.title, "Cats Home");
        assert_eq!(parsed.text, "Cats sleep all day rel abs js mail");
        let links: Vec<_> = parsed.links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec!["https://cats.example/dir/other", "https://cats.example/abs"]);
    }

    #[test]
    fn summary_remembers_first_outcome() {
        let mut summary = CrawlSummary::default();
        summary.record(TaskOutcome::FetchError);
        summary.record(TaskOutcome::Indexed);
        assert_eq!(summary.start, Some(TaskOutcome::FetchError));
        assert_eq!(summary.pages_stored(), 2);
    }
}
