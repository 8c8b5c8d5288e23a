//! Lexical product search: field indexes built once per corpus snapshot,
//! synonym expansion, boolean candidate filtering and composite ranking.

pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod persist;
pub mod rank;
pub mod search;
pub mod synonyms;
pub mod tokenizer;

pub use document::{DocStore, Document, StoredDoc};
pub use error::{Error, Result};
pub use filter::MatchMode;
pub use index::{
    DocId, FeatureIndex, Field, FieldIndex, IndexSet, InvertedIndex, PositionalIndex, ReviewIndex, ReviewStats,
    DEFAULT_ATTRIBUTES,
};
pub use rank::{CorpusStats, Ranker, RankingWeights, ScoreBreakdown};
pub use search::{SearchEngine, SearchHit, SearchMetadata, SearchResponse, DEFAULT_TOP_K};
pub use synonyms::SynonymTable;
