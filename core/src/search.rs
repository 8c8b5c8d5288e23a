//! Query pipeline: tokenize, expand, filter, rank, format.

use crate::document::{DocStore, Document};
use crate::error::Result;
use crate::filter::{filter, MatchMode};
use crate::index::{DocId, IndexSet};
use crate::persist::{load_index_set, IndexPaths};
use crate::rank::{CorpusStats, Ranker, RankingWeights, ScoreBreakdown};
use crate::synonyms::SynonymTable;
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_TOP_K: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: DocId,
    pub score: f64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub corpus_size: usize,
    pub candidate_count: usize,
    pub base_tokens: Vec<String>,
    pub expanded_tokens: Vec<String>,
    pub mode: MatchMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub ranked_results: Vec<SearchHit>,
    pub metadata: SearchMetadata,
}

/// Read-only query engine over one corpus snapshot. Shareable across threads as is.
pub struct SearchEngine {
    indexes: IndexSet,
    docs: DocStore,
    synonyms: SynonymTable,
    weights: RankingWeights,
    stats: CorpusStats,
}

impl SearchEngine {
    pub fn new(indexes: IndexSet, docs: DocStore, synonyms: SynonymTable, weights: RankingWeights) -> Self {
        let stats = CorpusStats::compute(&indexes);
        Self { indexes, docs, synonyms, weights, stats }
    }

    /// Build in memory straight from records.
    pub fn from_documents<S: AsRef<str>>(
        documents: &[Document],
        attributes: &[S],
        synonyms: SynonymTable,
        weights: RankingWeights,
    ) -> Self {
        Self::new(IndexSet::build(documents, attributes), DocStore::from_documents(documents), synonyms, weights)
    }

    /// Load persisted artifacts. Fails before any query can be served if one is missing or corrupt.
    pub fn open(paths: &IndexPaths, synonyms: SynonymTable, weights: RankingWeights) -> Result<Self> {
        let (indexes, docs, _meta) = load_index_set(paths)?;
        Ok(Self::new(indexes, docs, synonyms, weights))
    }

    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    pub fn docs(&self) -> &DocStore {
        &self.docs
    }

    pub fn corpus_size(&self) -> usize {
        self.stats.n()
    }

    pub fn ranker(&self) -> Ranker<'_> {
        Ranker::new(&self.indexes, &self.stats, &self.weights)
    }

    pub fn search(&self, query: &str, mode: MatchMode, top_k: usize) -> SearchResponse {
        self.search_until(query, mode, top_k, None)
    }

    /// [`SearchEngine::search`] with the ranking loop bounded by `deadline`.
    pub fn search_until(&self, query: &str, mode: MatchMode, top_k: usize, deadline: Option<Instant>) -> SearchResponse {
        let base_tokens = tokenize(query);
        let expanded: Vec<String> = self.synonyms.expand(&base_tokens).into_iter().collect();
        let consulted = self.weights.consulted_attributes();
        let candidates = filter(&expanded, mode, &self.indexes, &consulted, self.stats.universe());

        let mut ranked = self.ranker().rank_until(&base_tokens, &expanded, &candidates, deadline);
        ranked.truncate(top_k);
        tracing::debug!(query, %mode, candidates = candidates.len(), returned = ranked.len(), "search complete");

        SearchResponse {
            ranked_results: self.format(ranked),
            metadata: SearchMetadata {
                corpus_size: self.corpus_size(),
                candidate_count: candidates.len(),
                base_tokens,
                expanded_tokens: expanded,
                mode,
            },
        }
    }

    /// Per-signal score of one document for `query`.
    pub fn explain(&self, query: &str, doc_id: &str) -> ScoreBreakdown {
        let base_tokens = tokenize(query);
        let expanded: Vec<String> = self.synonyms.expand(&base_tokens).into_iter().collect();
        self.ranker().explain(&base_tokens, &expanded, doc_id)
    }

    fn format(&self, ranked: Vec<(f64, DocId)>) -> Vec<SearchHit> {
        ranked
            .into_iter()
            .map(|(score, document_id)| {
                let stored = self.docs.get(&document_id).cloned().unwrap_or_default();
                SearchHit { document_id, score, title: stored.title, description: stored.description }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchEngine>();
    }

    #[test]
    fn explain_total_matches_ranked_score() {
        let docs = vec![
            Document::new("a", "Energy Potion", "restores energy fast").with_ratings(&[4.0, 5.0]),
            Document::new("b", "Potion of Energy", "an energy potion for mages"),
        ];
        let engine = SearchEngine::from_documents(&docs, &["brand"], SynonymTable::default(), RankingWeights::default());
        let response = engine.search("energy potion", MatchMode::Any, 10);
        for hit in &response.ranked_results {
            let total = engine.explain("energy potion", &hit.document_id).total();
            assert!((total - hit.score).abs() < 1e-9);
        }
        assert!(engine.explain("energy potion", "a").exact_title > 0.0);
        assert_eq!(engine.explain("energy potion", "b").exact_title, 0.0);
        assert!(engine.explain("energy potion", "b").exact_description > 0.0);
    }
}
