use criterion::{criterion_group, criterion_main, Criterion};
use search_core::tokenizer::tokenize;
use search_core::{Document, MatchMode, RankingWeights, SearchEngine, SynonymTable, DEFAULT_ATTRIBUTES};
use serde_json::json;

const WORDS: &[&str] = &[
    "red", "blue", "sneakers", "sandals", "leather", "cotton", "italian", "energy", "potion", "beanie",
    "versatile", "light", "warm", "candy", "sweet", "box", "classic", "running", "trail", "wool",
];

fn corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let pick = |k: usize| WORDS[(i * 7 + k * 13) % WORDS.len()];
            Document::new(
                format!("https://shop.example/product/{i}"),
                format!("{} {} {}", pick(0), pick(1), pick(2)),
                (0..30).map(pick).collect::<Vec<_>>().join(" the "),
            )
            .with_feature("brand", json!(pick(3)))
            .with_feature("origin", json!(["Italy", "USA"][i % 2]))
            .with_ratings(&[(i % 5) as f64 + 1.0, 4.0])
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = corpus(1)[0].description_text().unwrap_or_default().repeat(20);
    c.bench_function("tokenize_description", |b| b.iter(|| tokenize(&text)));
}

fn bench_search(c: &mut Criterion) {
    let engine = SearchEngine::from_documents(&corpus(2_000), DEFAULT_ATTRIBUTES, SynonymTable::default(), RankingWeights::default());
    c.bench_function("search_any_two_terms", |b| b.iter(|| engine.search("italian sneakers", MatchMode::Any, 20)));
    c.bench_function("search_all_two_terms", |b| b.iter(|| engine.search("energy potion", MatchMode::All, 20)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
