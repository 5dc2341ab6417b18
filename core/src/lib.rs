pub mod index;
pub mod morphology;
pub mod persist;
pub mod search;
pub mod tokenizer;

pub use index::{Lemma, LemmaId, NewPage, Page, PageId, Posting, PostingId, Site, SiteId, SiteStatus};
pub use persist::{PageMatch, PurgeCounts, SledStore, Store, StoreError, StoreResult};
pub use search::{SearchEngine, SearchHit, SearchResponse};
pub use tokenizer::{extract_lemmas, lemma_frequencies, plain_text_frequencies, LemmaExtractor};
