//! Document records as produced by the crawler and consumed by the index builder.

use crate::error::Result;
use crate::index::{serialize_sorted, DocId};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One crawled record. Every field is optional on input: a partial crawl
/// yields partial records and the builder skips what it cannot use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Canonical identifier, the page URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    /// Attribute map. Anything but a JSON object reads as no attributes.
    #[serde(default, rename = "product_features", alias = "attributes")]
    pub features: Option<Value>,
    /// Review list. Anything but a JSON array reads as no ratings.
    #[serde(default, rename = "product_reviews", alias = "reviews")]
    pub reviews: Option<Value>,
}

impl Document {
    pub fn new(url: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            title: Some(Value::String(title.into())),
            description: Some(Value::String(description.into())),
            ..Self::default()
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: Value) -> Self {
        if !matches!(self.features, Some(Value::Object(_))) {
            self.features = Some(Value::Object(Map::new()));
        }
        if let Some(Value::Object(map)) = &mut self.features {
            map.insert(name.into(), value);
        }
        self
    }

    pub fn with_ratings(mut self, ratings: &[f64]) -> Self {
        if !matches!(self.reviews, Some(Value::Array(_))) {
            self.reviews = Some(Value::Array(Vec::new()));
        }
        if let Some(Value::Array(list)) = &mut self.reviews {
            list.extend(ratings.iter().map(|r| serde_json::json!({ "rating": r })));
        }
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// Title text, `None` when absent. A non-string value reads as empty text.
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_ref().map(|v| v.as_str().unwrap_or(""))
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_ref().map(|v| v.as_str().unwrap_or(""))
    }

    /// Attribute value flattened to indexable text, `None` when the document
    /// does not declare the attribute.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        self.features.as_ref()?.as_object()?.get(name).map(stringify)
    }

    /// Numeric ratings in stored order; entries without a numeric `rating` are ignored.
    pub fn ratings(&self) -> Vec<f64> {
        self.reviews
            .as_ref()
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("rating").and_then(Value::as_f64))
            .collect()
    }
}

/// Lists are joined with a space, scalars rendered as text, anything else
/// falls back to its JSON form.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

/// Parse JSON Lines. Blank lines are ignored and malformed lines are skipped
/// with a warning so one bad record does not sink the batch.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(&line) {
            Ok(doc) => docs.push(doc),
            Err(err) => tracing::warn!(line = line_no + 1, %err, "skipping malformed record"),
        }
    }
    Ok(docs)
}

pub fn read_jsonl(path: &Path) -> Result<Vec<Document>> {
    parse_jsonl(BufReader::new(File::open(path)?))
}

/// Read a `.json` file holding either one record or an array of records.
pub fn read_json(path: &Path) -> Result<Vec<Document>> {
    let json: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let docs = match json {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping malformed record");
                    None
                }
            })
            .collect(),
        Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    };
    Ok(docs)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    pub description: String,
    pub title: String,
}

/// Display text per document, used to render ranked results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DocStore {
    docs: HashMap<DocId, StoredDoc>,
}

impl DocStore {
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut docs = HashMap::new();
        for doc in documents {
            let Some(id) = doc.id() else { continue };
            docs.entry(id.to_string()).or_insert_with(|| StoredDoc {
                title: doc.title_text().unwrap_or_default().to_string(),
                description: doc.description_text().unwrap_or_default().to_string(),
            });
        }
        Self { docs }
    }

    pub fn get(&self, id: &str) -> Option<&StoredDoc> {
        self.docs.get(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub(crate) fn merge(&mut self, other: DocStore) {
        for (id, doc) in other.docs {
            self.docs.entry(id).or_insert(doc);
        }
    }
}

impl Serialize for DocStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_sorted(&self.docs, serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_attributes_join_with_spaces() {
        let doc = Document::new("u", "t", "d").with_feature("material", json!(["Cotton", "Wool"]));
        assert_eq!(doc.attribute_text("material").as_deref(), Some("Cotton Wool"));
        assert_eq!(doc.attribute_text("size"), None);
    }

    #[test]
    fn scalar_attributes_are_stringified() {
        let doc = Document::new("u", "t", "d").with_feature("size", json!(42));
        assert_eq!(doc.attribute_text("size").as_deref(), Some("42"));
    }

    #[test]
    fn non_string_title_reads_as_empty() {
        let doc: Document = serde_json::from_str(r#"{"url":"u","title":17}"#).unwrap();
        assert_eq!(doc.title_text(), Some(""));
        assert_eq!(doc.description_text(), None);
    }

    #[test]
    fn ratings_ignore_entries_without_numeric_rating() {
        let doc: Document = serde_json::from_str(
            r#"{"url":"u","product_reviews":[{"rating":3},{"text":"meh"},{"rating":"5"},{"rating":4.5}]}"#,
        )
        .unwrap();
        assert_eq!(doc.ratings(), vec![3.0, 4.5]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = "{\"url\":\"a\"}\n\nnot json\n{\"url\":\"b\"}\n";
        let docs = parse_jsonl(input.as_bytes()).unwrap();
        let ids: Vec<_> = docs.iter().filter_map(Document::id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn odd_feature_and_review_shapes_keep_the_record() {
        let input = concat!(
            r#"{"url":"a","title":"Wool Socks","product_features":"n/a"}"#,
            "\n",
            r#"{"url":"b","title":"Boots","product_reviews":{"rating":5}}"#,
            "\n",
            r#"{"url":"c","title":"Hat","product_features":{"brand":"Acme"},"product_reviews":[{"rating":4}]}"#,
            "\n",
        );
        let docs = parse_jsonl(input.as_bytes()).unwrap();
        let ids: Vec<_> = docs.iter().filter_map(Document::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(docs[0].attribute_text("brand"), None);
        assert_eq!(docs[0].title_text(), Some("Wool Socks"));
        assert!(docs[1].ratings().is_empty());
        assert_eq!(docs[2].attribute_text("brand").as_deref(), Some("Acme"));
        assert_eq!(docs[2].ratings(), vec![4.0]);
    }
}
