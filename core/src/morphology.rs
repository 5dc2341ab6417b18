//! Dictionary-backed morphological analyzers for the two supported languages.
//!
//! Each analyzer knows the closed word classes of its language (prepositions,
//! conjunctions, particles, interjections and a few pronouns), a table of
//! irregular inflections, and falls back to the Snowball stemmer for every
//! other word.

use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Pronoun,
    Preposition,
    Conjunction,
    Particle,
    Interjection,
    /// Open-class word the dictionary has no entry for.
    Unknown,
}

impl PartOfSpeech {
    /// Functional parts of speech never produce a lemma.
    pub fn is_functional(self) -> bool {
        matches!(
            self,
            PartOfSpeech::Preposition
                | PartOfSpeech::Conjunction
                | PartOfSpeech::Particle
                | PartOfSpeech::Interjection
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Russian,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => f.write_str("english"),
            Language::Russian => f.write_str("russian"),
        }
    }
}

/// Writing system of a lower-cased token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Cyrillic,
    /// Mixed scripts, accented letters or any other alphabet.
    Other,
}

impl Script {
    pub fn of(word: &str) -> Script {
        if word.is_empty() {
            return Script::Other;
        }
        if word.chars().all(|c| c.is_ascii_lowercase()) {
            Script::Latin
        } else if word.chars().all(is_russian_letter) {
            Script::Cyrillic
        } else {
            Script::Other
        }
    }

    pub fn language(self) -> Option<Language> {
        match self {
            Script::Latin => Some(Language::English),
            Script::Cyrillic => Some(Language::Russian),
            Script::Other => None,
        }
    }
}

fn is_russian_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'ё')
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MorphError {
    #[error("cannot analyze an empty word")]
    Empty,
    #[error("word {word:?} is not written in the {language} alphabet")]
    ForeignWord { word: String, language: Language },
}

/// Capability shared by every analyzer.
pub trait Morphology {
    /// Base forms of `word`, most likely first.
    fn normal_forms(&self, word: &str) -> Result<Vec<String>, MorphError>;
    /// Every grammatical reading of `word`.
    fn tags(&self, word: &str) -> Result<Vec<PartOfSpeech>, MorphError>;
}

struct Lexicon {
    language: Language,
    stemmer: Stemmer,
    closed_class: &'static HashMap<&'static str, &'static [PartOfSpeech]>,
    irregular: &'static HashMap<&'static str, (&'static str, PartOfSpeech)>,
}

impl Lexicon {
    fn check(&self, word: &str, valid: fn(char) -> bool) -> Result<(), MorphError> {
        if word.is_empty() {
            return Err(MorphError::Empty);
        }
        if !word.chars().all(valid) {
            return Err(MorphError::ForeignWord { word: word.to_string(), language: self.language });
        }
        Ok(())
    }

    fn normal_forms(&self, word: &str) -> Vec<String> {
        if let Some((base, _)) = self.irregular.get(word) {
            return vec![(*base).to_string()];
        }
        if self.closed_class.contains_key(word) {
            return vec![word.to_string()];
        }
        vec![self.stemmer.stem(word).into_owned()]
    }

    fn tags(&self, word: &str) -> Vec<PartOfSpeech> {
        if let Some(tags) = self.closed_class.get(word) {
            return tags.to_vec();
        }
        if let Some((_, pos)) = self.irregular.get(word) {
            return vec![*pos];
        }
        vec![PartOfSpeech::Unknown]
    }
}

pub struct EnglishMorphology {
    lexicon: Lexicon,
}

impl EnglishMorphology {
    pub fn new() -> Self {
        Self {
            lexicon: Lexicon {
                language: Language::English,
                stemmer: Stemmer::create(Algorithm::English),
                closed_class: &*EN_CLOSED_CLASS,
                irregular: &*EN_IRREGULAR,
            },
        }
    }
}

impl Default for EnglishMorphology {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphology for EnglishMorphology {
    fn normal_forms(&self, word: &str) -> Result<Vec<String>, MorphError> {
        self.lexicon.check(word, |c| c.is_ascii_lowercase())?;
        Ok(self.lexicon.normal_forms(word))
    }

    fn tags(&self, word: &str) -> Result<Vec<PartOfSpeech>, MorphError> {
        self.lexicon.check(word, |c| c.is_ascii_lowercase())?;
        Ok(self.lexicon.tags(word))
    }
}

pub struct RussianMorphology {
    lexicon: Lexicon,
}

impl RussianMorphology {
    pub fn new() -> Self {
        Self {
            lexicon: Lexicon {
                language: Language::Russian,
                stemmer: Stemmer::create(Algorithm::Russian),
                closed_class: &*RU_CLOSED_CLASS,
                irregular: &*RU_IRREGULAR,
            },
        }
    }
}

impl Default for RussianMorphology {
    fn default() -> Self {
        Self::new()
    }
}

// Dictionaries are written without "ё".
fn fold_yo(word: &str) -> String {
    word.replace('ё', "е")
}

impl Morphology for RussianMorphology {
    fn normal_forms(&self, word: &str) -> Result<Vec<String>, MorphError> {
        self.lexicon.check(word, is_russian_letter)?;
        Ok(self.lexicon.normal_forms(&fold_yo(word)))
    }

    fn tags(&self, word: &str) -> Result<Vec<PartOfSpeech>, MorphError> {
        self.lexicon.check(word, is_russian_letter)?;
        Ok(self.lexicon.tags(&fold_yo(word)))
    }
}

/// Closed set of analyzers, one per supported language.
pub enum Analyzer {
    English(EnglishMorphology),
    Russian(RussianMorphology),
}

impl Analyzer {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::English => Analyzer::English(EnglishMorphology::new()),
            Language::Russian => Analyzer::Russian(RussianMorphology::new()),
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Analyzer::English(_) => Language::English,
            Analyzer::Russian(_) => Language::Russian,
        }
    }
}

impl Morphology for Analyzer {
    fn normal_forms(&self, word: &str) -> Result<Vec<String>, MorphError> {
        match self {
            Analyzer::English(m) => m.normal_forms(word),
            Analyzer::Russian(m) => m.normal_forms(word),
        }
    }

    fn tags(&self, word: &str) -> Result<Vec<PartOfSpeech>, MorphError> {
        match self {
            Analyzer::English(m) => m.tags(word),
            Analyzer::Russian(m) => m.tags(word),
        }
    }
}

use PartOfSpeech::*;

const PREP: &[PartOfSpeech] = &[Preposition];
const CONJ: &[PartOfSpeech] = &[Conjunction];
const PART: &[PartOfSpeech] = &[Particle];
const INTJ: &[PartOfSpeech] = &[Interjection];
const PRON: &[PartOfSpeech] = &[Pronoun];

lazy_static! {
    static ref EN_CLOSED_CLASS: HashMap<&'static str, &'static [PartOfSpeech]> = {
        let mut m: HashMap<&'static str, &'static [PartOfSpeech]> = HashMap::new();
        for w in [
            "about", "above", "across", "after", "against", "along", "among", "around", "at",
            "before", "behind", "below", "beneath", "beside", "besides", "between", "beyond",
            "by", "despite", "during", "except", "for", "from", "in", "inside", "into", "near",
            "of", "off", "on", "onto", "outside", "over", "past", "per", "since", "through",
            "throughout", "till", "to", "toward", "towards", "under", "underneath", "until",
            "upon", "via", "with", "within", "without", "amid", "amongst",
        ] {
            m.insert(w, PREP);
        }
        for w in [
            "and", "but", "or", "nor", "yet", "because", "although", "though", "whereas",
            "unless", "whether", "than", "either", "neither", "if", "while", "whilst",
        ] {
            m.insert(w, CONJ);
        }
        // Articles are treated as particles.
        for w in ["the", "an", "not"] {
            m.insert(w, PART);
        }
        for w in [
            "oh", "ah", "wow", "hey", "ouch", "oops", "alas", "hmm", "hurray", "hooray", "ugh",
            "yay", "huh", "aha", "bravo", "eh", "uh", "um",
        ] {
            m.insert(w, INTJ);
        }
        for w in [
            "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your",
            "his", "its", "our", "their", "this", "that", "these", "those", "who", "whom",
            "which", "what",
        ] {
            m.insert(w, PRON);
        }
        // Words with a content reading alongside the functional one are kept.
        m.insert("as", &[Preposition, Conjunction, Adverb]);
        m.insert("so", &[Conjunction, Adverb]);
        m.insert("up", &[Preposition, Adverb]);
        m.insert("down", &[Preposition, Adverb]);
        m.insert("out", &[Preposition, Adverb]);
        m.insert("like", &[Preposition, Conjunction, Verb]);
        m.insert("round", &[Preposition, Adjective, Noun]);
        m.insert("well", &[Interjection, Adverb, Noun]);
        m.insert("just", &[Particle, Adjective, Adverb]);
        m
    };

    static ref EN_IRREGULAR: HashMap<&'static str, (&'static str, PartOfSpeech)> = {
        let verbs: &[(&str, &str)] = &[
            ("am", "be"), ("is", "be"), ("are", "be"), ("was", "be"), ("were", "be"),
            ("been", "be"), ("being", "be"), ("has", "have"), ("had", "have"),
            ("having", "have"), ("does", "do"), ("did", "do"), ("done", "do"),
            ("goes", "go"), ("went", "go"), ("gone", "go"), ("sat", "sit"), ("ran", "run"),
            ("ate", "eat"), ("eaten", "eat"), ("saw", "see"), ("seen", "see"),
            ("took", "take"), ("taken", "take"), ("gave", "give"), ("given", "give"),
            ("made", "make"), ("came", "come"), ("knew", "know"), ("known", "know"),
            ("got", "get"), ("gotten", "get"), ("found", "find"), ("thought", "think"),
            ("told", "tell"), ("became", "become"), ("left", "leave"), ("felt", "feel"),
            ("brought", "bring"), ("began", "begin"), ("begun", "begin"), ("kept", "keep"),
            ("held", "hold"), ("wrote", "write"), ("written", "write"), ("stood", "stand"),
            ("heard", "hear"), ("meant", "mean"), ("met", "meet"), ("paid", "pay"),
            ("said", "say"), ("sent", "send"), ("built", "build"), ("spoke", "speak"),
            ("spoken", "speak"), ("bought", "buy"), ("caught", "catch"), ("taught", "teach"),
            ("won", "win"), ("lost", "lose"), ("fell", "fall"), ("fallen", "fall"),
            ("drove", "drive"), ("driven", "drive"), ("flew", "fly"), ("flown", "fly"),
            ("grew", "grow"), ("grown", "grow"), ("threw", "throw"), ("thrown", "throw"),
            ("chose", "choose"), ("chosen", "choose"), ("broke", "break"),
            ("broken", "break"), ("wore", "wear"), ("worn", "wear"), ("led", "lead"),
            ("slept", "sleep"), ("sold", "sell"), ("understood", "understand"),
        ];
        let nouns: &[(&str, &str)] = &[
            ("men", "man"), ("women", "woman"), ("children", "child"), ("mice", "mouse"),
            ("feet", "foot"), ("teeth", "tooth"), ("geese", "goose"), ("lives", "life"),
            ("wives", "wife"), ("knives", "knife"), ("leaves", "leaf"),
        ];
        let adjectives: &[(&str, &str)] = &[
            ("better", "good"), ("best", "good"), ("worse", "bad"), ("worst", "bad"),
        ];
        let mut m = HashMap::new();
        for (form, base) in verbs { m.insert(*form, (*base, Verb)); }
        for (form, base) in nouns { m.insert(*form, (*base, Noun)); }
        for (form, base) in adjectives { m.insert(*form, (*base, Adjective)); }
        m
    };

    static ref RU_CLOSED_CLASS: HashMap<&'static str, &'static [PartOfSpeech]> = {
        let mut m: HashMap<&'static str, &'static [PartOfSpeech]> = HashMap::new();
        for w in [
            "в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "ото", "до",
            "из", "изо", "у", "за", "над", "надо", "под", "подо", "перед", "пред", "при",
            "про", "через", "для", "без", "между", "около", "после", "вокруг", "среди",
            "сквозь", "ради", "вдоль", "возле", "мимо", "против", "кроме",
        ] {
            m.insert(w, PREP);
        }
        for w in [
            "и", "а", "но", "или", "либо", "чтобы", "если", "хотя", "потому", "зато",
            "однако", "также", "тоже", "будто", "словно", "поэтому", "причем", "ибо",
        ] {
            m.insert(w, CONJ);
        }
        for w in [
            "не", "ни", "же", "ли", "бы", "б", "вот", "вон", "даже", "лишь", "разве",
            "неужели", "пусть", "пускай", "ведь", "мол", "якобы", "именно",
        ] {
            m.insert(w, PART);
        }
        for w in [
            "ах", "ох", "ой", "эх", "ух", "увы", "ура", "эй", "ого", "ага", "ай", "фу",
            "браво", "ну",
        ] {
            m.insert(w, INTJ);
        }
        for w in ["я", "ты", "он", "она", "оно", "мы", "вы", "они", "это", "этот", "тот"] {
            m.insert(w, PRON);
        }
        m.insert("да", &[Conjunction, Particle]);
        m.insert("что", &[Conjunction, Pronoun]);
        m.insert("как", &[Conjunction, Adverb]);
        m.insert("когда", &[Conjunction, Adverb]);
        m.insert("только", &[Particle, Adverb]);
        m.insert("уже", &[Particle, Adverb, Adjective]);
        m
    };

    static ref RU_IRREGULAR: HashMap<&'static str, (&'static str, PartOfSpeech)> = {
        let verbs: &[(&str, &str)] = &[
            ("шел", "идти"), ("шла", "идти"), ("шло", "идти"), ("шли", "идти"),
            ("иду", "идти"), ("идет", "идти"), ("идут", "идти"), ("пошел", "пойти"),
            ("пошла", "пойти"), ("пошли", "пойти"), ("был", "быть"), ("была", "быть"),
            ("было", "быть"), ("были", "быть"), ("будет", "быть"), ("будут", "быть"),
            ("ел", "есть"), ("ела", "есть"), ("ели", "есть"),
        ];
        let nouns: &[(&str, &str)] = &[
            ("люди", "человек"), ("людей", "человек"), ("людям", "человек"),
            ("дети", "ребенок"), ("детей", "ребенок"), ("детям", "ребенок"),
        ];
        let adjectives: &[(&str, &str)] = &[
            ("лучше", "хороший"), ("лучший", "хороший"), ("хуже", "плохой"),
        ];
        let mut m = HashMap::new();
        for (form, base) in verbs { m.insert(*form, (*base, Verb)); }
        for (form, base) in nouns { m.insert(*form, (*base, Noun)); }
        for (form, base) in adjectives { m.insert(*form, (*base, Adjective)); }
        m
    };
}
