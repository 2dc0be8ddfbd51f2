//! Search hits and the per-request candidate set
//!
//! A [`Candidate`] is one retrieved document for one query. Candidates pulled
//! for several query variants are collected into a [`CandidateSet`], which
//! keeps exactly one entry per document id.
//!
//! # Merge Policy
//!
//! - the candidate with the lowest retrieval distance wins
//! - on equal distance the candidate inserted first is kept
//! - iteration order is the order in which each id was first seen

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Arbitrary scalar metadata attached to a document
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A single retrieved document plus its scores for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Document identifier, stable across query variants
    pub doc_id: String,
    /// Document text
    pub text: String,
    /// Document metadata as returned by the index
    pub metadata: Metadata,
    /// Retrieval distance (lower is closer). Range depends on the index metric.
    pub distance: f32,
    /// Relevance score assigned by reranking. Only comparable within one search.
    pub relevance: Option<f32>,
}

impl Candidate {
    /// Create a candidate that has not been reranked yet.
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, distance: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            distance,
            relevance: None,
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Display band for the retrieval distance (cosine distance scale).
    #[must_use]
    pub fn band(&self) -> RelevanceBand {
        RelevanceBand::from_distance(self.distance)
    }

    /// Cosine similarity as a percentage rounded to one decimal, `(1 - d) * 100`.
    #[must_use]
    pub fn similarity_pct(&self) -> f32 {
        ((1.0 - self.distance) * 1000.0).round() / 10.0
    }
}

/// Sort candidates by ascending distance, keeping input order for ties.
pub fn sort_by_distance(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

/// Coarse quality label derived from cosine distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceBand {
    Excellent,
    Good,
    Fair,
    Weak,
}

impl RelevanceBand {
    #[must_use]
    pub fn from_distance(distance: f32) -> Self {
        if distance < 0.20 {
            Self::Excellent
        } else if distance < 0.35 {
            Self::Good
        } else if distance < 0.50 {
            Self::Fair
        } else {
            Self::Weak
        }
    }
}

impl fmt::Display for RelevanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Weak => "Weak",
        };
        f.write_str(label)
    }
}

/// Candidates keyed by document id, at most one per id.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<Candidate>,
    positions: HashMap<String, usize>,
}

impl CandidateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate, keeping the closer one when the id is already present.
    ///
    /// Returns `true` if the candidate was stored (new id, or strictly lower
    /// distance than the stored one).
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        match self.positions.get(&candidate.doc_id) {
            Some(&pos) => {
                // strict comparison: equal distance keeps the first-seen entry
                if candidate.distance < self.entries[pos].distance {
                    self.entries[pos] = candidate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.positions
                    .insert(candidate.doc_id.clone(), self.entries.len());
                self.entries.push(candidate);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, doc_id: &str) -> Option<&Candidate> {
        self.positions.get(doc_id).map(|&pos| &self.entries[pos])
    }

    #[must_use]
    pub fn contains(&self, doc_id: &str) -> bool {
        self.positions.contains_key(doc_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.entries.iter()
    }

    /// Lowest retrieval distance in the set.
    #[must_use]
    pub fn best_distance(&self) -> Option<f32> {
        self.entries
            .iter()
            .map(|c| c.distance)
            .min_by(f32::total_cmp)
    }

    /// Consume the set, returning candidates in ascending distance order.
    #[must_use]
    pub fn into_sorted_by_distance(self) -> Vec<Candidate> {
        let mut candidates = self.entries;
        sort_by_distance(&mut candidates);
        candidates
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
        let mut set = Self::new();
        for candidate in iter {
            set.insert(candidate);
        }
        set
    }
}

impl IntoIterator for CandidateSet {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
