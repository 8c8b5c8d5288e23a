//! Symmetric synonym table and single-hop query expansion.

use crate::error::{Error, Result};
use crate::tokenizer::tokenize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One canonical term and its alternates, each already normalized to tokens.
#[derive(Debug, Clone)]
struct SynonymGroup {
    canonical: Vec<String>,
    alternates: Vec<Vec<String>>,
}

impl SynonymGroup {
    /// A token names the group only through a single-word term; one word of
    /// a multi-word term is not enough.
    fn hits(&self, token: &str) -> bool {
        std::iter::once(&self.canonical)
            .chain(&self.alternates)
            .any(|term| matches!(term.as_slice(), [word] if word == token))
    }

    fn words(&self) -> impl Iterator<Item = &String> {
        self.canonical.iter().chain(self.alternates.iter().flatten())
    }
}

/// canonical term -> alternates, queryable from either side.
///
/// Terms go through the tokenizer. A multi-word term such as
/// `"united states"` is added word by word when its group is hit, but only
/// single-word terms trigger a group.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    groups: Vec<SynonymGroup>,
}

impl SynonymTable {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        let groups = entries
            .into_iter()
            .map(|(canonical, alternates)| SynonymGroup {
                canonical: tokenize(&canonical),
                alternates: alternates.iter().map(|a| tokenize(a)).collect(),
            })
            .filter(|g| g.words().next().is_some())
            .collect();
        Self { groups }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Load a JSON object of canonical term -> list of alternates.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::artifact(path, e))?;
        let table = Self::from_json_str(&raw).map_err(|e| Error::artifact(path, e))?;
        tracing::info!(path = %path.display(), groups = table.len(), "loaded synonym table");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `token` plus every word of every group naming it, as canonical or as alternate.
    pub fn lookup(&self, token: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::from([token.to_string()]);
        for group in self.groups.iter().filter(|g| g.hits(token)) {
            out.extend(group.words().cloned());
        }
        out
    }

    /// Union of [`SynonymTable::lookup`] over `tokens`. Always a superset of the input.
    ///
    /// Expansion is a single hop: groups chained through a shared word are
    /// not closed over, so repeated expansion is stable only when groups are disjoint.
    pub fn expand<I, S>(&self, tokens: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut expanded = BTreeSet::new();
        for token in tokens {
            expanded.extend(self.lookup(token.as_ref()));
        }
        expanded
    }
}

pub fn expand<S: AsRef<str>>(tokens: &[S], table: &SynonymTable) -> BTreeSet<String> {
    table.expand(tokens)
}
