use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;
pub type PostingId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Crawling,
    Indexed,
    Failed,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Crawling => "CRAWLING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A crawled website. The root URL is unique across the store and never
/// carries a trailing slash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub status_time: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Site {
    pub fn set_status(&mut self, status: SiteStatus) {
        self.status = status;
        self.status_time = OffsetDateTime::now_utc();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.set_status(SiteStatus::Failed);
        self.last_error = Some(error.into());
    }
}

/// A fetched page. Pages are immutable once stored; re-indexing a site goes
/// through a purge of the whole site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Site-relative path, unique per site.
    pub path: String,
    /// HTTP status of the fetch, 0 when the transport failed.
    pub code: u16,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewPage {
    pub site_id: SiteId,
    pub path: String,
    pub code: u16,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub lemma: String,
    /// Number of distinct pages of the site containing the lemma.
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    /// In-page occurrence count of the lemma.
    pub rank: f32,
}
