use criterion::{criterion_group, criterion_main, Criterion};
use sitesearch_core::tokenizer::extract_lemmas;

fn bench_extract(c: &mut Criterion) {
    let text = include_str!("../../README.md");
    c.bench_function("extract_lemmas_readme", |b| b.iter(|| extract_lemmas(text)));
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
