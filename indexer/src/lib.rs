use anyhow::{Context, Result};
use sitesearch_core::{Page, Store, StoreError};
use std::collections::HashMap;
use std::sync::Arc;

/// What one [`IndexWriter::write_index`] call changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub new_lemmas: usize,
    pub updated_lemmas: usize,
    pub postings: usize,
    pub duplicate_postings: usize,
}

/// Write path of the inverted index.
///
/// Each page bumps the document frequency of its lemmas by exactly one and
/// gets one posting per lemma ranked by the in-page count. Running it twice
/// for the same page counts the page twice; sites are purged before a
/// re-crawl for that reason.
pub struct IndexWriter {
    store: Arc<dyn Store>,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn write_index(&self, page: &Page, frequencies: &HashMap<String, u32>) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut entries: Vec<(&String, &u32)> = frequencies.iter().filter(|(_, count)| **count > 0).collect();
        entries.sort();

        for (text, count) in entries {
            let lemma = self
                .store
                .upsert_lemma(page.site_id, text)
                .with_context(|| format!("updating lemma {text:?}"))?;
            if lemma.frequency == 1 {
                stats.new_lemmas += 1;
            } else {
                stats.updated_lemmas += 1;
            }

            match self.store.insert_posting(page.id, lemma.id, *count as f32) {
                Ok(_) => stats.postings += 1,
                Err(StoreError::Duplicate { key, .. }) => {
                    tracing::warn!(path = %page.path, lemma = %text, %key, "duplicate posting dropped");
                    stats.duplicate_postings += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("storing posting for lemma {text:?}"));
                }
            }
        }

        tracing::debug!(
            path = %page.path,
            new_lemmas = stats.new_lemmas,
            updated_lemmas = stats.updated_lemmas,
            postings = stats.postings,
            "page indexed"
        );
        Ok(stats)
    }
}
