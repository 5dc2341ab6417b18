use crate::morphology::{Analyzer, Language, Morphology, Script};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::borrow::Cow;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Shorter tokens carry no searchable meaning and are dropped.
pub const MIN_TOKEN_CHARS: usize = 2;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}+").expect("valid regex");
    static ref MARKUP: Regex =
        Regex::new(r"<(?:/?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>]*)?|!--.*?--)>").expect("valid regex");
    static ref EXTRACTOR: LemmaExtractor = LemmaExtractor::new();
}

/// Split text into lower-cased letter runs using NFKC normalization.
/// Digits, punctuation and tokens shorter than [`MIN_TOKEN_CHARS`] are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

pub fn looks_like_html(text: &str) -> bool {
    MARKUP.is_match(text)
}

/// Plain text of `text`, parsing it as HTML only when it contains markup.
pub fn strip_markup(text: &str) -> Cow<'_, str> {
    if !looks_like_html(text) {
        return Cow::Borrowed(text);
    }
    let doc = Html::parse_document(text);
    Cow::Owned(visible_text(doc.root_element()))
}

/// Whitespace-collapsed text under `root`, skipping script and style bodies.
pub fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|el| el.name()))
            .map_or(false, |name| matches!(name, "script" | "style" | "noscript" | "template"));
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Turns text into the lemmas used for both indexing and querying.
///
/// Tokens are routed to the analyzer of their script; words whose every
/// reading is a preposition, conjunction, particle or interjection produce
/// nothing, and words an analyzer rejects are skipped on their own.
pub struct LemmaExtractor {
    english: Analyzer,
    russian: Analyzer,
}

impl LemmaExtractor {
    pub fn new() -> Self {
        Self {
            english: Analyzer::for_language(Language::English),
            russian: Analyzer::for_language(Language::Russian),
        }
    }

    pub fn analyzer(&self, language: Language) -> &Analyzer {
        match language {
            Language::English => &self.english,
            Language::Russian => &self.russian,
        }
    }

    /// One lemma per qualifying occurrence, in text order.
    pub fn extract_lemmas(&self, text: &str) -> Vec<String> {
        self.plain_text_lemmas(&strip_markup(text))
    }

    /// Like [`Self::extract_lemmas`] for text that is already plain, so
    /// tag-like words in it are read as words.
    pub fn plain_text_lemmas(&self, text: &str) -> Vec<String> {
        tokenize(text).iter().filter_map(|token| self.lemma_of(token)).collect()
    }

    pub fn lemma_frequencies(&self, text: &str) -> HashMap<String, u32> {
        count(self.extract_lemmas(text))
    }

    pub fn plain_text_frequencies(&self, text: &str) -> HashMap<String, u32> {
        count(self.plain_text_lemmas(text))
    }

    /// Lemma of a single lower-cased token, if it has one.
    pub fn lemma_of(&self, token: &str) -> Option<String> {
        let language = Script::of(token).language()?;
        let analyzer = self.analyzer(language);
        let tags = match analyzer.tags(token) {
            Ok(tags) => tags,
            Err(err) => {
                tracing::debug!(token, %err, "skipping token");
                return None;
            }
        };
        if !tags.is_empty() && tags.iter().all(|t| t.is_functional()) {
            return None;
        }
        match analyzer.normal_forms(token) {
            Ok(forms) => forms.into_iter().next(),
            Err(err) => {
                tracing::debug!(token, %err, "skipping token");
                None
            }
        }
    }
}

impl Default for LemmaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// [`LemmaExtractor::extract_lemmas`] on a shared extractor.
pub fn extract_lemmas(text: &str) -> Vec<String> {
    EXTRACTOR.extract_lemmas(text)
}

/// Per-lemma occurrence counts of `text`.
pub fn lemma_frequencies(text: &str) -> HashMap<String, u32> {
    EXTRACTOR.lemma_frequencies(text)
}

/// Per-lemma occurrence counts of text that is already plain, such as stored page content.
pub fn plain_text_frequencies(text: &str) -> HashMap<String, u32> {
    EXTRACTOR.plain_text_frequencies(text)
}

fn count(lemmas: Vec<String>) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for lemma in lemmas {
        *counts.entry(lemma).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run! 42 a");
        assert_eq!(t, vec!["running", "runner", "run"]);
    }

    #[test]
    fn strips_markup_only_when_present() {
        assert!(matches!(strip_markup("cats < dogs > mice"), Cow::Borrowed(_)));
        let plain = strip_markup("<p>Hello <b>world</b></p><script>var x = 1;</script>");
        assert_eq!(plain, "Hello world");
    }
}
