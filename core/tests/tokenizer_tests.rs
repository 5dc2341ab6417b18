use sitesearch_core::tokenizer::{extract_lemmas, lemma_frequencies, plain_text_frequencies, tokenize};

#[test]
fn it_drops_functional_words_and_keeps_order() {
    assert_eq!(extract_lemmas("the cat sat on the mat"), vec!["cat", "sit", "mat"]);
}

#[test]
fn it_normalizes_and_stems() {
    let words = extract_lemmas("Running Runners RUN! The cats' toys.");
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"cat".to_string()));
    assert!(!words.contains(&"the".to_string()));
}

#[test]
fn it_handles_both_languages() {
    let words = extract_lemmas("Леопард обитает в горах, and the leopard lives there");
    assert!(words.contains(&"леопард".to_string()));
    assert!(words.contains(&"leopard".to_string()));
    // "в" is too short, "and"/"the" are functional
    assert!(!words.iter().any(|w| w == "в" || w == "and" || w == "the"));
}

#[test]
fn it_drops_mixed_script_tokens() {
    // second word has a Cyrillic "а" in the middle
    assert_eq!(extract_lemmas("leopard leopаrd"), vec!["leopard"]);
}

#[test]
fn it_strips_markup() {
    let lemmas = extract_lemmas("<html><body><p>Cats</p><style>.mat { color: red }</style></body></html>");
    assert_eq!(lemmas, vec!["cat"]);
}

#[test]
fn it_is_deterministic() {
    let text = "Повторное появление леопарда в Осетии позволяет предположить, что леопард постоянно обитает";
    assert_eq!(extract_lemmas(text), extract_lemmas(text));
}

#[test]
fn it_counts_occurrences() {
    let freqs = lemma_frequencies("cat cats mat the");
    assert_eq!(freqs.get("cat"), Some(&2));
    assert_eq!(freqs.get("mat"), Some(&1));
    assert_eq!(freqs.len(), 2);
}

#[test]
fn it_skips_short_tokens_and_digits() {
    assert_eq!(tokenize("a 42 ok"), vec!["ok"]);
}

#[test]
fn it_reads_tag_like_words_in_plain_text() {
    let text = "put it in a <script> element, then feed the cat";
    let freqs = plain_text_frequencies(text);
    assert_eq!(freqs.get("cat"), Some(&1));
    assert!(freqs.contains_key("feed"));
}
