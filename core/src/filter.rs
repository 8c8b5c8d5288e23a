//! Boolean candidate filtering over the inverted indexes.

use crate::error::Error;
use crate::index::{DocId, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchMode {
    /// At least one token matches.
    #[default]
    Any,
    /// Every token matches, each possibly through a different field.
    All,
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" | "or" => Ok(MatchMode::Any),
            "all" | "and" => Ok(MatchMode::All),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Any => f.write_str("ANY"),
            MatchMode::All => f.write_str("ALL"),
        }
    }
}

/// Documents holding `token` in the title, the description or one of the
/// `consulted` attributes. Other tracked attributes only feed scoring.
pub fn token_documents<'a>(token: &str, indexes: &'a IndexSet, consulted: &[&str]) -> HashSet<&'a str> {
    let mut docs: HashSet<&str> = HashSet::new();
    let fields = [&indexes.title.inverted, &indexes.description.inverted];
    let attributes = consulted.iter().filter_map(|name| indexes.features.attribute(name));
    for index in fields.into_iter().chain(attributes) {
        if let Some(ids) = index.docs(token) {
            docs.extend(ids.iter().map(String::as_str));
        }
    }
    docs
}

/// Candidate documents for `tokens` under `mode`, restricted to `universe`.
/// No tokens means no candidates.
pub fn filter<I, S>(
    tokens: I,
    mode: MatchMode,
    indexes: &IndexSet,
    consulted: &[&str],
    universe: &HashSet<DocId>,
) -> BTreeSet<DocId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut acc: Option<HashSet<&str>> = None;
    for token in tokens {
        let docs = token_documents(token.as_ref(), indexes, consulted);
        acc = Some(match (acc, mode) {
            (None, _) => docs,
            (Some(mut seen), MatchMode::Any) => {
                seen.extend(docs);
                seen
            }
            (Some(seen), MatchMode::All) => seen.intersection(&docs).copied().collect(),
        });
    }
    acc.unwrap_or_default()
        .into_iter()
        .filter(|id| universe.contains(*id))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;

    const CONSULTED: &[&str] = &["brand", "origin"];

    fn indexes() -> IndexSet {
        let docs = vec![
            Document::new("a", "Red Sneakers", "comfortable shoes").with_feature("size", json!("Large")),
            Document::new("b", "Blue Sandals", "versatile sneakers").with_feature("origin", json!("Italy")),
            Document::new("c", "Candy", "sweet treat"),
        ];
        IndexSet::build(&docs, &["origin", "size"])
    }

    fn ids(set: &BTreeSet<DocId>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn any_is_union_of_token_sets() {
        let idx = indexes();
        let universe = idx.corpus();
        let out = filter(["sneakers", "candy"], MatchMode::Any, &idx, CONSULTED, &universe);
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
    }

    #[test]
    fn all_allows_tokens_from_different_fields() {
        let idx = indexes();
        let universe = idx.corpus();
        // "sandals" in title, "italy" in origin attribute of b
        let out = filter(["sandals", "italy"], MatchMode::All, &idx, CONSULTED, &universe);
        assert_eq!(ids(&out), vec!["b"]);
        let out = filter(["sneakers", "candy"], MatchMode::All, &idx, CONSULTED, &universe);
        assert!(out.is_empty());
    }

    #[test]
    fn unconsulted_attributes_do_not_make_candidates() {
        let idx = indexes();
        let universe = idx.corpus();
        assert!(idx.features.contains("size", "large", "a"));
        assert!(filter(["large"], MatchMode::Any, &idx, CONSULTED, &universe).is_empty());
        let out = filter(["large"], MatchMode::Any, &idx, &["size"], &universe);
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[test]
    fn empty_tokens_match_nothing() {
        let idx = indexes();
        let universe = idx.corpus();
        let none: [&str; 0] = [];
        assert!(filter(none, MatchMode::Any, &idx, CONSULTED, &universe).is_empty());
        assert!(filter(none, MatchMode::All, &idx, CONSULTED, &universe).is_empty());
    }

    #[test]
    fn mode_parses_both_spellings() {
        assert_eq!("OR".parse::<MatchMode>().unwrap(), MatchMode::Any);
        assert_eq!("all".parse::<MatchMode>().unwrap(), MatchMode::All);
        assert!("most".parse::<MatchMode>().is_err());
    }
}
