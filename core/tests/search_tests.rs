use search_core::persist::{save_index_set, IndexPaths};
use search_core::{
    DocStore, Document, Error, IndexSet, MatchMode, RankingWeights, SearchEngine, SynonymTable, DEFAULT_ATTRIBUTES,
};
use serde_json::json;
use std::time::Instant;
use tempfile::tempdir;

const A: &str = "https://shop.example/product/a";
const B: &str = "https://shop.example/product/b";
const C: &str = "https://shop.example/product/c";

fn three_docs() -> Vec<Document> {
    vec![
        Document::new(A, "Red Sneakers", "Bright and bold"),
        Document::new(B, "Canvas Shoes", "Comfortable versatile sneakers for daily walks"),
        Document::new(C, "Candy Box", "Sweet treats"),
    ]
}

fn engine(docs: &[Document], synonyms: SynonymTable) -> SearchEngine {
    SearchEngine::from_documents(docs, DEFAULT_ATTRIBUTES, synonyms, RankingWeights::default())
}

fn ids(response: &search_core::SearchResponse) -> Vec<&str> {
    response.ranked_results.iter().map(|h| h.document_id.as_str()).collect()
}

#[test]
fn title_match_outranks_description_match() {
    let engine = engine(&three_docs(), SynonymTable::default());
    let response = engine.search("sneakers", MatchMode::Any, 20);
    assert_eq!(ids(&response), vec![A, B]);
    assert_eq!(response.metadata.candidate_count, 2);
    assert_eq!(response.metadata.corpus_size, 3);
    assert_eq!(response.metadata.base_tokens, vec!["sneakers"]);
    assert_eq!(response.ranked_results[0].title, "Red Sneakers");
    assert_eq!(response.ranked_results[1].description, "Comfortable versatile sneakers for daily walks");
    assert!(response.ranked_results[0].score > response.ranked_results[1].score);
}

#[test]
fn empty_and_stopword_queries_return_nothing() {
    let engine = engine(&three_docs(), SynonymTable::default());
    for query in ["", "   ", "the and of", "with"] {
        let response = engine.search(query, MatchMode::Any, 20);
        assert!(response.ranked_results.is_empty(), "{query:?}");
        assert_eq!(response.metadata.candidate_count, 0);
        assert!(response.metadata.base_tokens.is_empty());
    }
}

#[test]
fn all_mode_requires_every_token() {
    let engine = engine(&three_docs(), SynonymTable::default());
    let all = engine.search("red sneakers", MatchMode::All, 20);
    assert_eq!(ids(&all), vec![A]);
    assert_eq!(all.metadata.mode, MatchMode::All);
    let any = engine.search("red sneakers", MatchMode::Any, 20);
    assert_eq!(ids(&any), vec![A, B]);
}

#[test]
fn synonyms_reach_attribute_indexes() {
    let docs = vec![
        Document::new("loafer", "Leather Loafers", "Hand stitched").with_feature("origin", json!("Italy")),
        Document::new("boot", "Leather Boots", "Hand stitched").with_feature("origin", json!("Spain")),
    ];
    let synonyms = SynonymTable::from_json_str(r#"{"italy": ["italian", "italia"]}"#).unwrap();
    let engine = engine(&docs, synonyms);

    let response = engine.search("italian leather", MatchMode::Any, 20);
    assert_eq!(ids(&response), vec!["loafer", "boot"]);
    assert_eq!(response.metadata.expanded_tokens, vec!["italia", "italian", "italy", "leather"]);
    assert_eq!(engine.explain("italian leather", "loafer").attributes, 6.0);

    // ALL applies to every expanded token, and nothing carries "italia"
    assert!(engine.search("italian leather", MatchMode::All, 20).ranked_results.is_empty());
}

#[test]
fn exact_phrase_wins_over_scattered_terms() {
    let docs = vec![
        Document::new("scattered", "Potion of Energy", "potion brewed for energy"),
        Document::new("phrase", "Energy Potion", "potion brewed for energy"),
    ];
    let engine = engine(&docs, SynonymTable::default());
    let response = engine.search("energy potion", MatchMode::Any, 20);
    assert_eq!(ids(&response), vec!["phrase", "scattered"]);
    assert!(response.ranked_results[0].score - response.ranked_results[1].score >= 10.0 - 1e-9);
}

#[test]
fn reviews_lift_otherwise_equal_documents() {
    let docs = vec![
        Document::new("plain", "Wool Socks", "warm"),
        Document::new("loved", "Wool Socks", "warm").with_ratings(&[5.0, 5.0, 4.0]),
    ];
    let engine = engine(&docs, SynonymTable::default());
    let response = engine.search("socks", MatchMode::Any, 20);
    assert_eq!(ids(&response), vec!["loved", "plain"]);
    let expected = 0.5 * 4f64.ln() * (14.0 / 3.0);
    assert!((engine.explain("socks", "loved").reviews - expected).abs() < 1e-9);
}

#[test]
fn equal_scores_order_by_document_id() {
    let docs = vec![
        Document::new("zulu", "Blue Mug", "ceramic"),
        Document::new("alpha", "Blue Mug", "ceramic"),
        Document::new("mike", "Blue Mug", "ceramic"),
    ];
    let engine = engine(&docs, SynonymTable::default());
    let response = engine.search("mug", MatchMode::Any, 20);
    assert_eq!(ids(&response), vec!["alpha", "mike", "zulu"]);
}

#[test]
fn top_k_truncates_results_but_not_candidates() {
    let engine = engine(&three_docs(), SynonymTable::default());
    let response = engine.search("sneakers", MatchMode::Any, 1);
    assert_eq!(ids(&response), vec![A]);
    assert_eq!(response.metadata.candidate_count, 2);
}

#[test]
fn expired_deadline_stops_ranking() {
    let engine = engine(&three_docs(), SynonymTable::default());
    let response = engine.search_until("sneakers", MatchMode::Any, 20, Some(Instant::now()));
    assert!(response.ranked_results.is_empty());
    assert_eq!(response.metadata.candidate_count, 2);
}

#[test]
fn persisted_engine_answers_like_in_memory_engine() {
    let docs = three_docs();
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    save_index_set(&paths, &IndexSet::build(&docs, DEFAULT_ATTRIBUTES), &DocStore::from_documents(&docs)).unwrap();

    let loaded = SearchEngine::open(&paths, SynonymTable::default(), RankingWeights::default()).unwrap();
    let in_memory = engine(&docs, SynonymTable::default());
    assert_eq!(
        loaded.search("versatile sneakers", MatchMode::Any, 20),
        in_memory.search("versatile sneakers", MatchMode::Any, 20)
    );
}

#[test]
fn opening_an_empty_directory_fails() {
    let dir = tempdir().unwrap();
    let result = SearchEngine::open(&IndexPaths::new(dir.path()), SynonymTable::default(), RankingWeights::default());
    assert!(matches!(result, Err(Error::ArtifactLoad { .. })));
}

#[test]
fn response_serializes_with_uppercase_mode() {
    let engine = engine(&three_docs(), SynonymTable::default());
    let value = serde_json::to_value(engine.search("candy", MatchMode::All, 5)).unwrap();
    assert_eq!(value["metadata"]["mode"], "ALL");
    assert_eq!(value["ranked_results"][0]["document_id"], C);
}

#[test]
fn weights_file_reorders_results() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(&path, r#"{"title_bm25": 0.0, "description_bm25": 10.0}"#).unwrap();
    let weights = RankingWeights::load(&path).unwrap();
    assert_eq!(weights.exact_title, RankingWeights::default().exact_title);

    let docs = three_docs();
    let engine = SearchEngine::from_documents(&docs, DEFAULT_ATTRIBUTES, SynonymTable::default(), weights);
    let response = engine.search("sneakers", MatchMode::Any, 10);
    assert_eq!(ids(&response), vec![B, A]);

    std::fs::write(&path, r#"{"title_bm25": "heavy"}"#).unwrap();
    assert!(matches!(RankingWeights::load(&path), Err(Error::Config(_))));
}

#[test]
fn size_and_material_values_alone_do_not_match() {
    let docs = vec![
        Document::new("a", "Wool Socks", "Warm and soft").with_feature("size", json!("Large")),
        Document::new("b", "Cotton Socks", "Breathable").with_feature("material", json!("Cotton")),
    ];
    let engine = engine(&docs, SynonymTable::default());

    let response = engine.search("large", MatchMode::Any, 20);
    assert!(response.ranked_results.is_empty());
    assert_eq!(response.metadata.candidate_count, 0);

    assert_eq!(engine.explain("socks large", "a").all_terms, 0.0);
    assert_eq!(engine.explain("socks", "a").all_terms, 2.0);
    assert_eq!(engine.explain("", "a").all_terms, 0.0);
    assert_eq!(ids(&engine.search("cotton", MatchMode::Any, 20)), vec!["b"]);
}
