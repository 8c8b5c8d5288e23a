//! Composite scoring: BM25 per field, exact-phrase bonus, attribute boosts and review quality.

use crate::error::{Error, Result};
use crate::index::{DocId, Field, IndexSet, PositionalIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

pub const DEFAULT_K1: f64 = 1.2;
pub const DEFAULT_B: f64 = 0.75;

/// Weights of the composite score. Every field defaults to the reference
/// weighting, so a partial JSON file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub k1: f64,
    pub b: f64,
    pub title_bm25: f64,
    pub description_bm25: f64,
    pub exact_title: f64,
    pub exact_description: f64,
    /// Added once when every base query token matches the document (title,
    /// description or a boosted attribute).
    pub all_terms: f64,
    /// Per-attribute boost, multiplied by the number of expanded tokens found in that attribute.
    pub attribute_boosts: BTreeMap<String, f64>,
    /// Multiplier of `ln(1 + review_count) * mean_rating`.
    pub review: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            title_bm25: 2.5,
            description_bm25: 1.0,
            exact_title: 10.0,
            exact_description: 2.0,
            all_terms: 2.0,
            attribute_boosts: BTreeMap::from([("brand".to_string(), 4.0), ("origin".to_string(), 6.0)]),
            review: 0.5,
        }
    }
}

impl RankingWeights {
    /// Attributes that count as a field match for filtering and the
    /// all-terms bonus: the boosted ones.
    pub fn consulted_attributes(&self) -> Vec<&str> {
        self.attribute_boosts.keys().map(String::as_str).collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Document lengths of one field.
#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    lengths: HashMap<DocId, u32>,
    avg_len: f64,
}

impl FieldStats {
    /// Length = sum of posting lengths; average over documents with a nonzero length.
    pub fn compute(positional: &PositionalIndex) -> Self {
        let mut lengths: HashMap<DocId, u32> = HashMap::new();
        for (_, docs) in positional.iter() {
            for (id, offsets) in docs {
                *lengths.entry(id.clone()).or_insert(0) += offsets.len() as u32;
            }
        }
        let avg_len = if lengths.is_empty() {
            0.0
        } else {
            lengths.values().map(|&l| l as f64).sum::<f64>() / lengths.len() as f64
        };
        Self { lengths, avg_len }
    }

    pub fn doc_len(&self, doc_id: &str) -> u32 {
        self.lengths.get(doc_id).copied().unwrap_or(0)
    }

    pub fn avg_len(&self) -> f64 {
        self.avg_len
    }
}

/// Corpus-wide figures computed once per loaded index.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    universe: HashSet<DocId>,
    title: FieldStats,
    description: FieldStats,
}

impl CorpusStats {
    pub fn compute(indexes: &IndexSet) -> Self {
        Self {
            universe: indexes.corpus(),
            title: FieldStats::compute(&indexes.title.positional),
            description: FieldStats::compute(&indexes.description.positional),
        }
    }

    /// Corpus size N.
    pub fn n(&self) -> usize {
        self.universe.len()
    }

    pub fn universe(&self) -> &HashSet<DocId> {
        &self.universe
    }

    pub fn field(&self, field: Field) -> &FieldStats {
        match field {
            Field::Title => &self.title,
            Field::Description => &self.description,
        }
    }
}

/// Weighted contribution of every signal to one document's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub title_bm25: f64,
    pub description_bm25: f64,
    pub exact_title: f64,
    pub exact_description: f64,
    pub all_terms: f64,
    pub attributes: f64,
    pub reviews: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.title_bm25
            + self.description_bm25
            + self.exact_title
            + self.exact_description
            + self.all_terms
            + self.attributes
            + self.reviews
    }
}

pub struct Ranker<'a> {
    indexes: &'a IndexSet,
    stats: &'a CorpusStats,
    weights: &'a RankingWeights,
}

impl<'a> Ranker<'a> {
    pub fn new(indexes: &'a IndexSet, stats: &'a CorpusStats, weights: &'a RankingWeights) -> Self {
        Self { indexes, stats, weights }
    }

    /// `ln(N / df)`, or 0 for a token the field has never seen.
    pub fn idf(&self, token: &str, field: Field) -> f64 {
        let df = self.indexes.field(field).positional.df(token);
        if df == 0 {
            return 0.0;
        }
        (self.stats.n() as f64 / df as f64).ln()
    }

    pub fn tf(&self, token: &str, doc_id: &str, field: Field) -> usize {
        self.indexes.field(field).positional.tf(token, doc_id)
    }

    pub fn bm25<I, S>(&self, tokens: I, doc_id: &str, field: Field) -> f64
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (k1, b) = (self.weights.k1, self.weights.b);
        let stats = self.stats.field(field);
        let avg_len = stats.avg_len();
        let len_ratio = if avg_len > 0.0 { stats.doc_len(doc_id) as f64 / avg_len } else { 0.0 };
        let mut score = 0.0;
        for token in tokens {
            let token = token.as_ref();
            let f = self.tf(token, doc_id, field) as f64;
            if f == 0.0 {
                continue;
            }
            let denom = f + k1 * (1.0 - b + b * len_ratio);
            score += self.idf(token, field) * (f * (k1 + 1.0)) / if denom > 0.0 { denom } else { 1.0 };
        }
        score
    }

    /// Whether `tokens` occur contiguously, in order, in the field. Needs two or more tokens.
    pub fn exact_match<S: AsRef<str>>(&self, tokens: &[S], doc_id: &str, field: Field) -> bool {
        exact_match(&self.indexes.field(field).positional, tokens, doc_id)
    }

    /// Number of `tokens` found in the named attribute of the document.
    pub fn attribute_hits<I, S>(&self, tokens: I, doc_id: &str, attribute: &str) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .filter(|t| self.indexes.features.contains(attribute, t.as_ref(), doc_id))
            .count()
    }

    /// `ln(1 + review_count) * mean_rating`, before weighting.
    pub fn review_quality(&self, doc_id: &str) -> f64 {
        let stats = self.indexes.reviews.get(doc_id);
        (1.0 + stats.count as f64).ln() * stats.mean
    }

    pub fn explain<S, T>(&self, base: &[S], expanded: &[T], doc_id: &str) -> ScoreBreakdown
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let w = self.weights;
        let consulted = w.consulted_attributes();
        let all_terms =
            !base.is_empty() && base.iter().all(|t| self.indexes.doc_contains(t.as_ref(), doc_id, &consulted));
        let attributes = w
            .attribute_boosts
            .iter()
            .map(|(attribute, boost)| boost * self.attribute_hits(expanded, doc_id, attribute) as f64)
            .sum();
        ScoreBreakdown {
            title_bm25: w.title_bm25 * self.bm25(expanded, doc_id, Field::Title),
            description_bm25: w.description_bm25 * self.bm25(expanded, doc_id, Field::Description),
            exact_title: flag(w.exact_title, self.exact_match(base, doc_id, Field::Title)),
            exact_description: flag(w.exact_description, self.exact_match(base, doc_id, Field::Description)),
            all_terms: flag(w.all_terms, all_terms),
            attributes,
            reviews: w.review * self.review_quality(doc_id),
        }
    }

    pub fn score<S, T>(&self, base: &[S], expanded: &[T], doc_id: &str) -> f64
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        self.explain(base, expanded, doc_id).total()
    }

    /// Score every candidate and order by descending score, ties by ascending id.
    pub fn rank<'c, S, T, C>(&self, base: &[S], expanded: &[T], candidates: C) -> Vec<(f64, DocId)>
    where
        S: AsRef<str>,
        T: AsRef<str>,
        C: IntoIterator<Item = &'c DocId>,
    {
        self.rank_until(base, expanded, candidates, None)
    }

    /// [`Ranker::rank`], abandoning the remaining candidates once `deadline` has passed.
    pub fn rank_until<'c, S, T, C>(
        &self,
        base: &[S],
        expanded: &[T],
        candidates: C,
        deadline: Option<Instant>,
    ) -> Vec<(f64, DocId)>
    where
        S: AsRef<str>,
        T: AsRef<str>,
        C: IntoIterator<Item = &'c DocId>,
    {
        let mut scored = Vec::new();
        for doc_id in candidates {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(scored = scored.len(), "ranking deadline reached; remaining candidates dropped");
                break;
            }
            scored.push((self.score(base, expanded, doc_id), doc_id.clone()));
        }
        sort_ranked(&mut scored);
        scored
    }
}

fn flag(weight: f64, hit: bool) -> f64 {
    if hit {
        weight
    } else {
        0.0
    }
}

pub fn sort_ranked(scored: &mut [(f64, DocId)]) {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
}

/// Some start offset `p` has token `i` at `p + i` for every `i`.
pub fn exact_match<S: AsRef<str>>(positional: &PositionalIndex, tokens: &[S], doc_id: &str) -> bool {
    if tokens.len() < 2 {
        return false;
    }
    let postings: Vec<&[u32]> = tokens.iter().map(|t| positional.offsets(t.as_ref(), doc_id)).collect();
    if postings.iter().any(|offsets| offsets.is_empty()) {
        return false;
    }
    postings[0].iter().any(|&start| {
        postings
            .iter()
            .enumerate()
            .skip(1)
            .all(|(i, offsets)| offsets.binary_search(&(start + i as u32)).is_ok())
    })
}
