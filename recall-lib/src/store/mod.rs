//! Vector storage backends
//!
//! The pipeline never talks to a store directly: it sees an opaque
//! [`VectorIndex`](crate::index::VectorIndex). Stores exist so a local index can
//! be assembled from an embedder and a set of documents.
//!
//! # Storage Model
//!
//! Each stored item consists of:
//! - Document: the original text and metadata
//! - Embedding: the vector representation
//!
//! The distance metric is chosen when the store is created and never changes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::candidate::Metadata;
use crate::embed::Embedding;
use crate::Result;

/// A document as held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this document
    pub id: String,
    /// The text content
    pub text: String,
    /// Arbitrary scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
}

/// Distance metric used by a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in [0, 2]
    #[default]
    Cosine,
    /// L2 distance, in [0, inf)
    Euclidean,
}

impl DistanceMetric {
    /// Threshold used when the config does not set one.
    #[must_use]
    pub fn default_threshold(self) -> f32 {
        match self {
            Self::Cosine => 0.40,
            Self::Euclidean => 1.0,
        }
    }

    /// Distance between two vectors of equal length.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction. Zero vectors
/// have similarity 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// A stored document with its distance to a query
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    /// Distance to the query (lower is closer)
    pub distance: f32,
}

// Ordered by distance, then id, so heap-based top-k is deterministic.
impl Ord for ScoredDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.document.id.cmp(&other.document.id))
    }
}

impl PartialOrd for ScoredDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScoredDocument {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDocument {}

/// Trait for vector storage backends
pub trait VectorStore: Send + Sync {
    /// Insert documents with their embeddings
    ///
    /// # Arguments
    /// * `documents` - The documents to store
    /// * `embeddings` - Corresponding embeddings (must be same length)
    ///
    /// Re-inserting an id replaces the stored document.
    fn insert(&mut self, documents: &[Document], embeddings: &[Embedding]) -> Result<()>;

    /// Search for the `k` nearest documents
    ///
    /// # Returns
    /// Up to `k` results sorted by distance (closest first)
    fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    /// Metric this store measures distance with
    fn metric(&self) -> DistanceMetric;

    /// Get total number of stored documents
    fn len(&self) -> usize;

    /// Check if store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data
    fn clear(&mut self);
}

mod memory;

pub use memory::*;
