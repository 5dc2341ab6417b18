use crate::persist::{Store, StoreError};
use crate::tokenizer::LemmaExtractor;
use crate::{Site, SiteId};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 20;
const SNIPPET_CHARS: usize = 200;
const SNIPPET_LEAD_CHARS: usize = 50;

pub const EMPTY_QUERY: &str = "empty search query";
pub const UNPROCESSABLE_QUERY: &str = "could not process query";
pub const SEARCH_FAILED: &str = "search failed";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: bool,
    /// Matches before pagination.
    pub count: usize,
    pub data: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { result: false, count: 0, data: Vec::new(), error: Some(message.into()) }
    }

    fn success(count: usize, data: Vec<SearchHit>) -> Self {
        Self { result: true, count, data, error: None }
    }
}

/// Answers free-text queries against the lemma index.
pub struct SearchEngine {
    store: Arc<dyn Store>,
    extractor: LemmaExtractor,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, extractor: LemmaExtractor::new() }
    }

    /// Pages containing every lemma of `query`, best first.
    ///
    /// `site` restricts the search to one site root URL. Invalid input and
    /// storage failures come back as a failed response rather than an error.
    pub fn search(&self, query: &str, site: Option<&str>, offset: usize, limit: usize) -> SearchResponse {
        if query.trim().is_empty() {
            return SearchResponse::failure(EMPTY_QUERY);
        }
        if limit == 0 {
            return SearchResponse::failure("limit must be positive");
        }
        match self.run(query, site, offset, limit) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(query, %err, "search failed");
                SearchResponse::failure(SEARCH_FAILED)
            }
        }
    }

    fn run(&self, query: &str, site: Option<&str>, offset: usize, limit: usize) -> Result<SearchResponse, StoreError> {
        let lemmas = self.query_lemmas(query);
        if lemmas.is_empty() {
            return Ok(SearchResponse::failure(UNPROCESSABLE_QUERY));
        }

        let site_id = match site.map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => match self.store.find_site_by_url(url.trim_end_matches('/'))? {
                Some(site) => Some(site.id),
                None => return Ok(SearchResponse::failure(format!("site {url} is not indexed"))),
            },
            None => None,
        };

        let mut matches = self.store.find_pages_matching_all_lemmas(&lemmas, site_id)?;
        matches.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
                .then(a.page_id.cmp(&b.page_id))
        });
        let total = matches.len();
        tracing::debug!(query, ?lemmas, total, "search matched");

        let highlighter = highlighter(&lemmas);
        let mut sites: HashMap<SiteId, Site> = HashMap::new();
        let mut hits = Vec::new();
        for m in matches.into_iter().skip(offset).take(limit) {
            let Some(page) = self.store.get_page(m.page_id)? else { continue };
            if !sites.contains_key(&m.site_id) {
                let Some(site) = self.store.get_site(m.site_id)? else { continue };
                sites.insert(m.site_id, site);
            }
            let site = &sites[&m.site_id];
            hits.push(SearchHit {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: page.path.clone(),
                title: page.title.clone(),
                snippet: highlighter.as_ref().map(|re| snippet(&page.content, re, &page.path)).unwrap_or_default(),
                relevance: m.relevance,
            });
        }
        Ok(SearchResponse::success(total, hits))
    }

    /// Distinct lemmas of the query in first-seen order.
    fn query_lemmas(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.extractor.extract_lemmas(query).into_iter().filter(|l| seen.insert(l.clone())).collect()
    }
}

/// Case-insensitive alternation of the lemmas, longest first.
fn highlighter(lemmas: &[String]) -> Option<Regex> {
    let mut terms: Vec<&String> = lemmas.iter().filter(|l| !l.is_empty()).collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    let pattern = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

/// Window of text around the earliest lemma occurrence with every
/// occurrence inside it wrapped in a link to the page.
fn snippet(content: &str, highlighter: &Regex, path: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let start = match highlighter.find(content) {
        Some(m) => content[..m.start()].chars().count().saturating_sub(SNIPPET_LEAD_CHARS),
        None => 0,
    };
    let window: String = content.chars().skip(start).take(SNIPPET_CHARS).collect();
    let marked = highlighter.replace_all(&window, |caps: &regex::Captures| {
        format!("<b><a href=\"{}\">{}</a></b>", path, &caps[0])
    });
    format!("...{marked}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::SledStore;
    use crate::NewPage;

    fn two_page_site() -> (Arc<dyn Store>, u64, u64) {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://cats.example", "Cats").unwrap();
        let a = store
            .insert_page(NewPage {
                site_id: site.id,
                path: "/a".into(),
                code: 200,
                title: "Page A".into(),
                content: "A cat sleeps on the Mat all day.".into(),
            })
            .unwrap()
            .unwrap();
        let b = store
            .insert_page(NewPage {
                site_id: site.id,
                path: "/b".into(),
                code: 200,
                title: "Page B".into(),
                content: "Cat and another cat.".into(),
            })
            .unwrap()
            .unwrap();
        let cat = store.upsert_lemma(site.id, "cat").unwrap();
        store.upsert_lemma(site.id, "cat").unwrap();
        let mat = store.upsert_lemma(site.id, "mat").unwrap();
        store.insert_posting(a.id, cat.id, 1.0).unwrap();
        store.insert_posting(a.id, mat.id, 1.0).unwrap();
        store.insert_posting(b.id, cat.id, 2.0).unwrap();
        (Arc::new(store), a.id, b.id)
    }

    #[test]
    fn empty_query_fails_cleanly() {
        let (store, _, _) = two_page_site();
        let engine = SearchEngine::new(store);
        let resp = engine.search("   ", None, 0, 10);
        assert!(!resp.result);
        assert_eq!(resp.error.as_deref(), Some(EMPTY_QUERY));
    }

    #[test]
    fn query_of_functional_words_is_unprocessable() {
        let (store, _, _) = two_page_site();
        let engine = SearchEngine::new(store);
        let resp = engine.search("on the and", None, 0, 10);
        assert_eq!(resp.error.as_deref(), Some(UNPROCESSABLE_QUERY));
    }

    #[test]
    fn every_lemma_must_match() {
        let (store, _, _) = two_page_site();
        let engine = SearchEngine::new(store);
        let resp = engine.search("cat mat", None, 0, 10);
        assert!(resp.result);
        assert_eq!(resp.count, 1);
        assert_eq!(resp.data[0].uri, "/a");
        assert_eq!(resp.data[0].relevance, 2.0);
        assert_eq!(resp.data[0].site, "https://cats.example");

        let none = engine.search("cat dog", None, 0, 10);
        assert!(none.result);
        assert_eq!(none.count, 0);
    }

    #[test]
    fn ranks_by_summed_rank_then_page_id() {
        let (store, a, b) = two_page_site();
        let engine = SearchEngine::new(store);
        let resp = engine.search("cats", None, 0, 10);
        let uris: Vec<_> = resp.data.iter().map(|h| h.uri.as_str()).collect();
        assert_eq!(uris, vec!["/b", "/a"]);
        assert!(a < b);

        let page = engine.search("cats", None, 1, 1);
        assert_eq!(page.count, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].uri, "/a");
    }

    #[test]
    fn unknown_site_filter_fails() {
        let (store, _, _) = two_page_site();
        let engine = SearchEngine::new(store);
        let resp = engine.search("cat", Some("https://dogs.example"), 0, 10);
        assert!(!resp.result);
        let ok = engine.search("cat", Some("https://cats.example/"), 0, 10);
        assert_eq!(ok.count, 2);
    }

    #[test]
    fn response_serializes_in_camel_case() {
        let (store, _, _) = two_page_site();
        let engine = SearchEngine::new(store);
        let json = serde_json::to_value(engine.search("mat", None, 0, 10)).unwrap();
        assert_eq!(json["result"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["siteName"], "Cats");
        assert!(json.get("error").is_none());

        let failed = serde_json::to_value(SearchResponse::failure(EMPTY_QUERY)).unwrap();
        assert_eq!(failed["error"], EMPTY_QUERY);
    }

    #[test]
    fn snippet_highlights_case_insensitively() {
        let re = highlighter(&["cat".to_string(), "mat".to_string()]).unwrap();
        let s = snippet("A Cat sleeps on the MAT.", &re, "/a");
        assert_eq!(
            s,
            "...A <b><a href=\"/a\">Cat</a></b> sleeps on the <b><a href=\"/a\">MAT</a></b>...."
        );
    }

    #[test]
    fn snippet_window_starts_before_first_match() {
        let re = highlighter(&["needle".to_string()]).unwrap();
        let text = format!("{}needle{}", "x".repeat(300), "y".repeat(300));
        let s = snippet(&text, &re, "/p");
        let inner = s.trim_start_matches("...");
        assert!(inner.starts_with(&"x".repeat(50)));
        assert!(inner.contains("<b><a href=\"/p\">needle</a></b>"));
    }
}
