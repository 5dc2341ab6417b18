//! Storage contract of the index and its sled-backed implementation.

use crate::{Lemma, LemmaId, NewPage, Page, PageId, Posting, Site, SiteId, SiteStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("corrupt key in {0}")]
    Corrupt(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Rows removed by a site purge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCounts {
    pub postings: usize,
    pub lemmas: usize,
    pub pages: usize,
}

/// A page containing every lemma of a query, with its summed ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMatch {
    pub page_id: PageId,
    pub site_id: SiteId,
    pub relevance: f64,
}

/// Everything the crawler, index writer and search engine need from storage.
///
/// Implementations enforce uniqueness of site URL, (site, path),
/// (site, lemma) and (page, lemma) themselves; callers treat their own
/// checks as shortcuts only.
pub trait Store: Send + Sync {
    fn find_site_by_url(&self, url: &str) -> StoreResult<Option<Site>>;
    fn get_site(&self, id: SiteId) -> StoreResult<Option<Site>>;
    fn list_sites(&self) -> StoreResult<Vec<Site>>;
    /// Creates a site in the `Crawling` state.
    fn insert_site(&self, url: &str, name: &str) -> StoreResult<Site>;
    fn update_site(&self, site: &Site) -> StoreResult<()>;
    /// Removes a site with its postings, lemmas and pages.
    fn delete_site(&self, id: SiteId) -> StoreResult<PurgeCounts>;

    fn page_exists(&self, site_id: SiteId, path: &str) -> StoreResult<bool>;
    /// Stores a page unless the site already has one at that path.
    fn insert_page(&self, page: NewPage) -> StoreResult<Option<Page>>;
    fn get_page(&self, id: PageId) -> StoreResult<Option<Page>>;
    fn count_pages(&self, site_id: SiteId) -> StoreResult<usize>;

    fn find_lemma(&self, site_id: SiteId, text: &str) -> StoreResult<Option<Lemma>>;
    /// Inserts the lemma with frequency 1, or atomically adds 1 to it.
    fn upsert_lemma(&self, site_id: SiteId, text: &str) -> StoreResult<Lemma>;
    fn count_lemmas(&self, site_id: SiteId) -> StoreResult<usize>;

    /// Fails with [`StoreError::Duplicate`] when the page already has a
    /// posting for the lemma.
    fn insert_posting(&self, page_id: PageId, lemma_id: LemmaId, rank: f32) -> StoreResult<Posting>;
    fn postings_for_lemma(&self, lemma_id: LemmaId) -> StoreResult<Vec<Posting>>;

    fn sites_with_status(&self, status: SiteStatus) -> StoreResult<Vec<Site>> {
        Ok(self.list_sites()?.into_iter().filter(|s| s.status == status).collect())
    }

    /// Pages holding every one of `lemmas`, optionally restricted to one site.
    fn find_pages_matching_all_lemmas(
        &self,
        lemmas: &[String],
        site: Option<SiteId>,
    ) -> StoreResult<Vec<PageMatch>> {
        if lemmas.is_empty() {
            return Ok(Vec::new());
        }
        let site_ids = match site {
            Some(id) => vec![id],
            None => self.list_sites()?.into_iter().map(|s| s.id).collect(),
        };
        let mut matches = Vec::new();
        'sites: for site_id in site_ids {
            let mut found = Vec::with_capacity(lemmas.len());
            for text in lemmas {
                match self.find_lemma(site_id, text)? {
                    Some(lemma) => found.push(lemma),
                    None => continue 'sites,
                }
            }
            // rarest lemma first keeps the running intersection small
            found.sort_by_key(|l| l.frequency);
            let mut acc: Option<HashMap<PageId, f64>> = None;
            for lemma in &found {
                let postings = self.postings_for_lemma(lemma.id)?;
                let next: HashMap<PageId, f64> = match acc {
                    None => postings.into_iter().map(|p| (p.page_id, p.rank as f64)).collect(),
                    Some(prev) => postings
                        .into_iter()
                        .filter_map(|p| prev.get(&p.page_id).map(|r| (p.page_id, r + p.rank as f64)))
                        .collect(),
                };
                if next.is_empty() {
                    continue 'sites;
                }
                acc = Some(next);
            }
            if let Some(pages) = acc {
                matches.extend(
                    pages.into_iter().map(|(page_id, relevance)| PageMatch { page_id, site_id, relevance }),
                );
            }
        }
        Ok(matches)
    }
}

/// [`Store`] over a sled database.
///
/// Secondary-key trees (`site_urls`, `page_paths`, `lemma_texts`) map unique
/// keys to row ids and are claimed with compare-and-swap; postings are keyed
/// by `lemma_id ++ page_id` so a posting list is a prefix scan.
pub struct SledStore {
    db: sled::Db,
    sites: sled::Tree,
    site_urls: sled::Tree,
    pages: sled::Tree,
    page_paths: sled::Tree,
    lemmas: sled::Tree,
    lemma_texts: sled::Tree,
    postings: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        Ok(Self {
            sites: db.open_tree("sites")?,
            site_urls: db.open_tree("site_urls")?,
            pages: db.open_tree("pages")?,
            page_paths: db.open_tree("page_paths")?,
            lemmas: db.open_tree("lemmas")?,
            lemma_texts: db.open_tree("lemma_texts")?,
            postings: db.open_tree("postings")?,
            db,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn next_id(&self) -> StoreResult<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    fn increment_lemma(&self, id: LemmaId) -> StoreResult<Lemma> {
        let mut codec_err = None;
        let updated = self.lemmas.update_and_fetch(id.to_be_bytes(), |old| {
            let old = old?;
            let bumped = bincode::deserialize::<Lemma>(old).and_then(|mut lemma| {
                lemma.frequency += 1;
                bincode::serialize(&lemma)
            });
            match bumped {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    codec_err = Some(err);
                    Some(old.to_vec())
                }
            }
        })?;
        if let Some(err) = codec_err {
            return Err(err.into());
        }
        match updated {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::NotFound { entity: "lemma", id }),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn decode_id(bytes: &[u8], tree: &'static str) -> StoreResult<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StoreError::Corrupt(tree))?;
    Ok(u64::from_be_bytes(raw))
}

/// `owner ++ suffix`, the layout of every composite key.
fn compound_key(owner: u64, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + suffix.len());
    key.extend_from_slice(&owner.to_be_bytes());
    key.extend_from_slice(suffix);
    key
}

fn get_row<T: DeserializeOwned>(tree: &sled::Tree, id: u64) -> StoreResult<Option<T>> {
    match tree.get(id.to_be_bytes())? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

impl Store for SledStore {
    fn find_site_by_url(&self, url: &str) -> StoreResult<Option<Site>> {
        match self.site_urls.get(url.as_bytes())? {
            Some(id) => get_row(&self.sites, decode_id(&id, "site_urls")?),
            None => Ok(None),
        }
    }

    fn get_site(&self, id: SiteId) -> StoreResult<Option<Site>> {
        get_row(&self.sites, id)
    }

    fn list_sites(&self) -> StoreResult<Vec<Site>> {
        self.sites.iter().values().map(|v| decode(&v?)).collect()
    }

    fn insert_site(&self, url: &str, name: &str) -> StoreResult<Site> {
        let id = self.next_id()?;
        let site = Site {
            id,
            url: url.to_string(),
            name: name.to_string(),
            status: SiteStatus::Crawling,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        };
        self.sites.insert(id.to_be_bytes(), encode(&site)?)?;
        let claimed = self.site_urls.compare_and_swap(
            url.as_bytes(),
            None as Option<&[u8]>,
            Some(id.to_be_bytes().to_vec()),
        )?;
        if claimed.is_err() {
            self.sites.remove(id.to_be_bytes())?;
            return Err(StoreError::Duplicate { entity: "site", key: url.to_string() });
        }
        Ok(site)
    }

    fn update_site(&self, site: &Site) -> StoreResult<()> {
        if !self.sites.contains_key(site.id.to_be_bytes())? {
            return Err(StoreError::NotFound { entity: "site", id: site.id });
        }
        self.sites.insert(site.id.to_be_bytes(), encode(site)?)?;
        Ok(())
    }

    fn delete_site(&self, id: SiteId) -> StoreResult<PurgeCounts> {
        let Some(site) = get_row::<Site>(&self.sites, id)? else {
            return Err(StoreError::NotFound { entity: "site", id });
        };
        let mut counts = PurgeCounts::default();
        let prefix = id.to_be_bytes();

        for entry in self.lemma_texts.scan_prefix(prefix) {
            let (key, lemma_id) = entry?;
            let lemma_id = decode_id(&lemma_id, "lemma_texts")?;
            for posting in self.postings.scan_prefix(lemma_id.to_be_bytes()) {
                let (posting_key, _) = posting?;
                self.postings.remove(posting_key)?;
                counts.postings += 1;
            }
            self.lemmas.remove(lemma_id.to_be_bytes())?;
            self.lemma_texts.remove(key)?;
            counts.lemmas += 1;
        }

        for entry in self.page_paths.scan_prefix(prefix) {
            let (key, page_id) = entry?;
            self.pages.remove(&page_id)?;
            self.page_paths.remove(key)?;
            counts.pages += 1;
        }

        self.site_urls.remove(site.url.as_bytes())?;
        self.sites.remove(prefix)?;
        Ok(counts)
    }

    fn page_exists(&self, site_id: SiteId, path: &str) -> StoreResult<bool> {
        Ok(self.page_paths.contains_key(compound_key(site_id, path.as_bytes()))?)
    }

    fn insert_page(&self, page: NewPage) -> StoreResult<Option<Page>> {
        let path_key = compound_key(page.site_id, page.path.as_bytes());
        if self.page_paths.contains_key(&path_key)? {
            return Ok(None);
        }
        let id = self.next_id()?;
        let page = Page {
            id,
            site_id: page.site_id,
            path: page.path,
            code: page.code,
            title: page.title,
            content: page.content,
        };
        self.pages.insert(id.to_be_bytes(), encode(&page)?)?;
        let claimed = self.page_paths.compare_and_swap(
            path_key,
            None as Option<&[u8]>,
            Some(id.to_be_bytes().to_vec()),
        )?;
        if claimed.is_err() {
            self.pages.remove(id.to_be_bytes())?;
            return Ok(None);
        }
        Ok(Some(page))
    }

    fn get_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        get_row(&self.pages, id)
    }

    fn count_pages(&self, site_id: SiteId) -> StoreResult<usize> {
        Ok(self.page_paths.scan_prefix(site_id.to_be_bytes()).count())
    }

    fn find_lemma(&self, site_id: SiteId, text: &str) -> StoreResult<Option<Lemma>> {
        match self.lemma_texts.get(compound_key(site_id, text.as_bytes()))? {
            Some(id) => get_row(&self.lemmas, decode_id(&id, "lemma_texts")?),
            None => Ok(None),
        }
    }

    fn upsert_lemma(&self, site_id: SiteId, text: &str) -> StoreResult<Lemma> {
        let text_key = compound_key(site_id, text.as_bytes());
        loop {
            if let Some(id) = self.lemma_texts.get(&text_key)? {
                return self.increment_lemma(decode_id(&id, "lemma_texts")?);
            }
            let id = self.next_id()?;
            let lemma = Lemma { id, site_id, lemma: text.to_string(), frequency: 1 };
            self.lemmas.insert(id.to_be_bytes(), encode(&lemma)?)?;
            let claimed = self.lemma_texts.compare_and_swap(
                &text_key,
                None as Option<&[u8]>,
                Some(id.to_be_bytes().to_vec()),
            )?;
            match claimed {
                Ok(()) => return Ok(lemma),
                // another writer created it first; count this page on theirs
                Err(_) => {
                    self.lemmas.remove(id.to_be_bytes())?;
                }
            }
        }
    }

    fn count_lemmas(&self, site_id: SiteId) -> StoreResult<usize> {
        Ok(self.lemma_texts.scan_prefix(site_id.to_be_bytes()).count())
    }

    fn insert_posting(&self, page_id: PageId, lemma_id: LemmaId, rank: f32) -> StoreResult<Posting> {
        let key = compound_key(lemma_id, &page_id.to_be_bytes());
        let posting = Posting { id: self.next_id()?, page_id, lemma_id, rank };
        let claimed = self.postings.compare_and_swap(&key, None as Option<&[u8]>, Some(encode(&posting)?))?;
        if claimed.is_err() {
            return Err(StoreError::Duplicate {
                entity: "posting",
                key: format!("page {page_id} lemma {lemma_id}"),
            });
        }
        Ok(posting)
    }

    fn postings_for_lemma(&self, lemma_id: LemmaId) -> StoreResult<Vec<Posting>> {
        self.postings.scan_prefix(lemma_id.to_be_bytes()).values().map(|v| decode(&v?)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(site_id: SiteId, path: &str) -> NewPage {
        NewPage { site_id, path: path.into(), code: 200, title: String::new(), content: String::new() }
    }

    #[test]
    fn site_url_is_unique() {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://a.example", "A").unwrap();
        assert_eq!(site.status, SiteStatus::Crawling);
        let err = store.insert_site("https://a.example", "A again").unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "site", .. }));
        assert_eq!(store.find_site_by_url("https://a.example").unwrap(), Some(site));
    }

    #[test]
    fn page_path_is_unique_per_site() {
        let store = SledStore::temporary().unwrap();
        let a = store.insert_site("https://a.example", "A").unwrap();
        let b = store.insert_site("https://b.example", "B").unwrap();
        assert!(store.insert_page(page(a.id, "/")).unwrap().is_some());
        assert!(store.insert_page(page(a.id, "/")).unwrap().is_none());
        assert!(store.insert_page(page(b.id, "/")).unwrap().is_some());
        assert!(store.page_exists(a.id, "/").unwrap());
        assert_eq!(store.count_pages(a.id).unwrap(), 1);
    }

    #[test]
    fn upsert_lemma_counts_calls() {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://a.example", "A").unwrap();
        let first = store.upsert_lemma(site.id, "cat").unwrap();
        let second = store.upsert_lemma(site.id, "cat").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.frequency, 2);
        assert_eq!(store.count_lemmas(site.id).unwrap(), 1);
    }

    #[test]
    fn concurrent_upserts_are_not_lost() {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://a.example", "A").unwrap();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        store.upsert_lemma(site.id, "cat").unwrap();
                    }
                });
            }
        });
        assert_eq!(store.find_lemma(site.id, "cat").unwrap().unwrap().frequency, 200);
        assert_eq!(store.count_lemmas(site.id).unwrap(), 1);
    }

    #[test]
    fn duplicate_posting_is_rejected() {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://a.example", "A").unwrap();
        let p = store.insert_page(page(site.id, "/")).unwrap().unwrap();
        let lemma = store.upsert_lemma(site.id, "cat").unwrap();
        store.insert_posting(p.id, lemma.id, 3.0).unwrap();
        let err = store.insert_posting(p.id, lemma.id, 1.0).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "posting", .. }));
        let postings = store.postings_for_lemma(lemma.id).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].rank, 3.0);
    }

    #[test]
    fn delete_site_cascades_only_its_rows() {
        let store = SledStore::temporary().unwrap();
        let a = store.insert_site("https://a.example", "A").unwrap();
        let b = store.insert_site("https://b.example", "B").unwrap();
        for site in [&a, &b] {
            let p = store.insert_page(page(site.id, "/")).unwrap().unwrap();
            let l = store.upsert_lemma(site.id, "cat").unwrap();
            store.insert_posting(p.id, l.id, 1.0).unwrap();
        }

        let counts = store.delete_site(a.id).unwrap();
        assert_eq!(counts, PurgeCounts { postings: 1, lemmas: 1, pages: 1 });
        assert!(store.find_site_by_url("https://a.example").unwrap().is_none());
        assert!(store.find_lemma(a.id, "cat").unwrap().is_none());
        assert_eq!(store.count_pages(a.id).unwrap(), 0);

        let kept = store.find_lemma(b.id, "cat").unwrap().unwrap();
        assert_eq!(store.postings_for_lemma(kept.id).unwrap().len(), 1);
        // the URL can be claimed again after the purge
        store.insert_site("https://a.example", "A").unwrap();
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let site_id = {
            let store = SledStore::open(dir.path()).unwrap();
            let site = store.insert_site("https://a.example", "A").unwrap();
            store.upsert_lemma(site.id, "cat").unwrap();
            store.flush().unwrap();
            site.id
        };

        let store = SledStore::open(dir.path()).unwrap();
        let site = store.find_site_by_url("https://a.example").unwrap().unwrap();
        assert_eq!(site.id, site_id);
        assert_eq!(store.find_lemma(site_id, "cat").unwrap().unwrap().frequency, 1);
        let other = store.insert_site("https://b.example", "B").unwrap();
        assert_ne!(other.id, site_id);
    }

    #[test]
    fn matching_requires_every_lemma() {
        let store = SledStore::temporary().unwrap();
        let site = store.insert_site("https://a.example", "A").unwrap();
        let a = store.insert_page(page(site.id, "/a")).unwrap().unwrap();
        let b = store.insert_page(page(site.id, "/b")).unwrap().unwrap();
        let cat = store.upsert_lemma(site.id, "cat").unwrap();
        store.upsert_lemma(site.id, "cat").unwrap();
        let mat = store.upsert_lemma(site.id, "mat").unwrap();
        store.insert_posting(a.id, cat.id, 1.0).unwrap();
        store.insert_posting(a.id, mat.id, 1.0).unwrap();
        store.insert_posting(b.id, cat.id, 2.0).unwrap();

        let lemmas = vec!["cat".to_string(), "mat".to_string()];
        let matches = store.find_pages_matching_all_lemmas(&lemmas, Some(site.id)).unwrap();
        assert_eq!(matches, vec![PageMatch { page_id: a.id, site_id: site.id, relevance: 2.0 }]);

        let missing = vec!["cat".to_string(), "dog".to_string()];
        assert!(store.find_pages_matching_all_lemmas(&missing, None).unwrap().is_empty());
    }
}
