use crate::document::Document;
use crate::tokenizer::tokenize;
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Canonical document identifier (the page URL).
pub type DocId = String;

/// Default attribute names tracked by the feature index.
pub const DEFAULT_ATTRIBUTES: &[&str] = &["brand", "origin", "material", "size"];

/// Text fields carrying positional postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Description,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Title, Field::Description];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
        }
    }

    pub fn text(self, doc: &Document) -> Option<&str> {
        match self {
            Field::Title => doc.title_text(),
            Field::Description => doc.description_text(),
        }
    }
}

/// Serialize a hash map with its keys in lexicographic order.
pub(crate) fn serialize_sorted<S, V>(map: &HashMap<String, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    let sorted: BTreeMap<&str, &V> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    sorted.serialize(serializer)
}

/// token -> documents containing it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct InvertedIndex {
    postings: HashMap<String, HashSet<DocId>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: &str, doc_id: &str) {
        if let Some(docs) = self.postings.get_mut(token) {
            if !docs.contains(doc_id) {
                docs.insert(doc_id.to_string());
            }
        } else {
            self.postings.insert(token.to_string(), HashSet::from([doc_id.to_string()]));
        }
    }

    pub fn docs(&self, token: &str) -> Option<&HashSet<DocId>> {
        self.postings.get(token)
    }

    pub fn contains(&self, token: &str, doc_id: &str) -> bool {
        self.postings.get(token).is_some_and(|docs| docs.contains(doc_id))
    }

    pub fn df(&self, token: &str) -> usize {
        self.postings.get(token).map_or(0, HashSet::len)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Set union per token.
    pub fn merge(&mut self, other: InvertedIndex) {
        for (token, docs) in other.postings {
            self.postings.entry(token).or_default().extend(docs);
        }
    }
}

impl Serialize for InvertedIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&str, Vec<&str>> = self
            .postings
            .iter()
            .map(|(token, docs)| {
                let mut ids: Vec<&str> = docs.iter().map(String::as_str).collect();
                ids.sort_unstable();
                (token.as_str(), ids)
            })
            .collect();
        sorted.serialize(serializer)
    }
}

/// token -> document -> ordered offsets within the field
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PositionalIndex {
    postings: HashMap<String, HashMap<DocId, Vec<u32>>>,
}

impl PositionalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an offset to the (token, document) posting. Offsets must be pushed in increasing order.
    pub fn push(&mut self, token: &str, doc_id: &str, offset: u32) {
        self.postings
            .entry(token.to_string())
            .or_default()
            .entry(doc_id.to_string())
            .or_default()
            .push(offset);
    }

    pub fn postings(&self, token: &str) -> Option<&HashMap<DocId, Vec<u32>>> {
        self.postings.get(token)
    }

    /// Offsets of `token` in `doc_id`; empty when either is unknown.
    pub fn offsets(&self, token: &str, doc_id: &str) -> &[u32] {
        self.postings
            .get(token)
            .and_then(|docs| docs.get(doc_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tf(&self, token: &str, doc_id: &str) -> usize {
        self.offsets(token, doc_id).len()
    }

    pub fn df(&self, token: &str) -> usize {
        self.postings.get(token).map_or(0, HashMap::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HashMap<DocId, Vec<u32>>)> {
        self.postings.iter().map(|(t, docs)| (t.as_str(), docs))
    }

    pub fn doc_ids(&self) -> HashSet<&str> {
        self.postings.values().flat_map(|docs| docs.keys().map(String::as_str)).collect()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// The inverted view of this index: same tokens, same documents.
    pub fn to_inverted(&self) -> InvertedIndex {
        let postings = self
            .postings
            .iter()
            .map(|(token, docs)| (token.clone(), docs.keys().cloned().collect()))
            .collect();
        InvertedIndex { postings }
    }

    /// Merge a shard built over disjoint documents. Documents already present
    /// here keep their postings; the shard's copy is ignored.
    pub fn merge(&mut self, other: PositionalIndex) {
        let existing: HashSet<DocId> = self.doc_ids().into_iter().map(str::to_string).collect();
        for (token, docs) in other.postings {
            for (doc_id, mut offsets) in docs {
                if existing.contains(&doc_id) {
                    continue;
                }
                offsets.sort_unstable();
                self.postings.entry(token.clone()).or_default().insert(doc_id, offsets);
            }
        }
    }
}

impl Serialize for PositionalIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&str, BTreeMap<&str, &Vec<u32>>> = self
            .postings
            .iter()
            .map(|(token, docs)| {
                let docs = docs.iter().map(|(id, offsets)| (id.as_str(), offsets)).collect();
                (token.as_str(), docs)
            })
            .collect();
        sorted.serialize(serializer)
    }
}

/// Inverted and positional postings of one text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldIndex {
    pub inverted: InvertedIndex,
    pub positional: PositionalIndex,
}

impl FieldIndex {
    /// A document id is listed for a token in one index iff it is listed in
    /// the other, and every positional posting is non-empty.
    pub fn is_consistent(&self) -> bool {
        if self.inverted.len() != self.positional.len() {
            return false;
        }
        self.positional.iter().all(|(token, docs)| {
            self.inverted.docs(token).is_some_and(|ids| {
                ids.len() == docs.len()
                    && docs.iter().all(|(id, offsets)| !offsets.is_empty() && ids.contains(id))
            })
        })
    }

    pub fn merge(&mut self, other: FieldIndex) {
        self.positional.merge(other.positional);
        self.inverted = self.positional.to_inverted();
    }
}

/// First record of every id, in input order. Records without an id are
/// dropped; a later record reusing an id is ignored entirely.
pub fn unique_documents(documents: &[Document]) -> Vec<&Document> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::with_capacity(documents.len());
    for doc in documents {
        let Some(id) = doc.id() else {
            tracing::debug!("skipping document without id");
            continue;
        };
        if seen.insert(id) {
            unique.push(doc);
        } else {
            tracing::warn!(id, "duplicate document id; keeping first occurrence");
        }
    }
    unique
}

/// Tokenize `field` of every document, one offset per retained token.
/// The first record of an id claims it even when it lacks the field.
pub fn build_field_index<D: Borrow<Document>>(documents: &[D], field: Field) -> FieldIndex {
    let mut index = FieldIndex::default();
    let mut seen: HashSet<&str> = HashSet::new();
    for doc in documents {
        let doc: &Document = doc.borrow();
        let Some(id) = doc.id() else { continue };
        if !seen.insert(id) {
            continue;
        }
        let Some(text) = field.text(doc) else {
            tracing::debug!(id, field = field.name(), "skipping document without field");
            continue;
        };
        for (offset, token) in tokenize(text).iter().enumerate() {
            index.inverted.insert(token, id);
            index.positional.push(token, id, offset as u32);
        }
    }
    index
}

/// One inverted index per tracked attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureIndex {
    indexes: BTreeMap<String, InvertedIndex>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: impl Into<String>, index: InvertedIndex) {
        self.indexes.insert(attribute.into(), index);
    }

    pub fn attribute(&self, name: &str) -> Option<&InvertedIndex> {
        self.indexes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InvertedIndex)> {
        self.indexes.iter().map(|(name, idx)| (name.as_str(), idx))
    }

    /// Whether `doc_id` carries `token` in the named attribute. Unknown attributes never match.
    pub fn contains(&self, attribute: &str, token: &str, doc_id: &str) -> bool {
        self.indexes.get(attribute).is_some_and(|idx| idx.contains(token, doc_id))
    }

    pub fn merge(&mut self, other: FeatureIndex) {
        for (name, index) in other.indexes {
            self.indexes.entry(name).or_default().merge(index);
        }
    }
}

pub fn build_feature_index<D, S>(documents: &[D], attributes: &[S]) -> FeatureIndex
where
    D: Borrow<Document>,
    S: AsRef<str>,
{
    let mut features = FeatureIndex::new();
    for attribute in attributes {
        let attribute = attribute.as_ref();
        let mut index = InvertedIndex::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for doc in documents {
            let doc: &Document = doc.borrow();
            let Some(id) = doc.id() else { continue };
            if !seen.insert(id) {
                continue;
            }
            let Some(text) = doc.attribute_text(attribute) else { continue };
            for token in tokenize(&text) {
                index.insert(&token, id);
            }
        }
        tracing::debug!(attribute, terms = index.len(), "built attribute index");
        features.insert(attribute, index);
    }
    features
}

/// Review summary of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    #[serde(alias = "nb_ratings")]
    pub count: u32,
    #[serde(alias = "last_rating")]
    pub last: f64,
    #[serde(alias = "avg_rating")]
    pub mean: f64,
}

impl ReviewStats {
    pub fn from_ratings(ratings: &[f64]) -> Self {
        match ratings.last() {
            None => Self::default(),
            Some(&last) => Self {
                count: ratings.len() as u32,
                last,
                mean: ratings.iter().sum::<f64>() / ratings.len() as f64,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ReviewIndex {
    stats: HashMap<DocId, ReviewStats>,
}

impl ReviewIndex {
    /// Stats for `doc_id`, zeroed when unknown.
    pub fn get(&self, doc_id: &str) -> ReviewStats {
        self.stats.get(doc_id).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, doc_id: impl Into<DocId>, stats: ReviewStats) {
        self.stats.insert(doc_id.into(), stats);
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn merge(&mut self, other: ReviewIndex) {
        for (id, stats) in other.stats {
            self.stats.entry(id).or_insert(stats);
        }
    }
}

impl Serialize for ReviewIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_sorted(&self.stats, serializer)
    }
}

pub fn build_review_index<D: Borrow<Document>>(documents: &[D]) -> ReviewIndex {
    let mut index = ReviewIndex::default();
    for doc in documents {
        let doc: &Document = doc.borrow();
        let Some(id) = doc.id() else { continue };
        index.stats.entry(id.to_string()).or_insert_with(|| ReviewStats::from_ratings(&doc.ratings()));
    }
    index
}

/// Every structure the query path reads. Immutable once built or loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSet {
    pub title: FieldIndex,
    pub description: FieldIndex,
    pub features: FeatureIndex,
    pub reviews: ReviewIndex,
}

impl IndexSet {
    pub fn build<S: AsRef<str>>(documents: &[Document], attributes: &[S]) -> Self {
        let unique = unique_documents(documents);
        let set = Self::build_unique(&unique, attributes);
        tracing::info!(records = documents.len(), documents = unique.len(), "built index set");
        set
    }

    /// Build over records already reduced to one per id.
    fn build_unique<S: AsRef<str>>(documents: &[&Document], attributes: &[S]) -> Self {
        let set = Self {
            title: build_field_index(documents, Field::Title),
            description: build_field_index(documents, Field::Description),
            features: build_feature_index(documents, attributes),
            reviews: build_review_index(documents),
        };
        tracing::debug!(
            documents = documents.len(),
            title_terms = set.title.inverted.len(),
            description_terms = set.description.inverted.len(),
            reviews = set.reviews.len(),
            "built index shard"
        );
        set
    }

    /// Build over `shards` contiguous slices in parallel and merge. Ids are
    /// made unique before sharding, so shards never overlap and the result
    /// equals [`IndexSet::build`].
    pub fn build_parallel<S>(documents: &[Document], attributes: &[S], shards: usize) -> Self
    where
        S: AsRef<str> + Sync,
    {
        let unique = unique_documents(documents);
        if unique.is_empty() {
            return Self::build_unique(&unique, attributes);
        }
        let chunk = unique.len().div_ceil(shards.max(1));
        let set = unique
            .par_chunks(chunk)
            .map(|shard| Self::build_unique(shard, attributes))
            .reduce(
                Self::default,
                |mut left, right| {
                    left.merge(right);
                    left
                },
            );
        tracing::info!(documents = unique.len(), shards, "built index set in parallel");
        set
    }

    /// Merge a shard built from documents that follow this set's documents.
    pub fn merge(&mut self, other: IndexSet) {
        self.title.merge(other.title);
        self.description.merge(other.description);
        self.features.merge(other.features);
        self.reviews.merge(other.reviews);
    }

    pub fn field(&self, field: Field) -> &FieldIndex {
        match field {
            Field::Title => &self.title,
            Field::Description => &self.description,
        }
    }

    /// Distinct document ids across the title and description positional indexes.
    pub fn corpus(&self) -> HashSet<DocId> {
        let mut ids = self.title.positional.doc_ids();
        ids.extend(self.description.positional.doc_ids());
        ids.into_iter().map(str::to_string).collect()
    }

    /// Whether `token` occurs for `doc_id` in the title, the description or
    /// one of the `consulted` attributes.
    pub fn doc_contains(&self, token: &str, doc_id: &str, consulted: &[&str]) -> bool {
        self.title.inverted.contains(token, doc_id)
            || self.description.inverted.contains(token, doc_id)
            || consulted.iter().any(|name| self.features.contains(name, token, doc_id))
    }
}
