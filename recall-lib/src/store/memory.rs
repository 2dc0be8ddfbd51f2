use std::collections::{BinaryHeap, HashMap};

use crate::embed::Embedding;
use crate::store::{DistanceMetric, Document, ScoredDocument, VectorStore};
use crate::{Error, Result};

/// In-memory vector store for development and testing.
///
/// Uses brute-force search over every stored vector. Suitable for small
/// corpora (< 10k documents). For production, use a proper vector database.
pub struct MemoryStore {
    metric: DistanceMetric,
    dimension: Option<usize>,
    entries: HashMap<String, (Document, Embedding)>,
}

impl MemoryStore {
    /// Create a new empty store using cosine distance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_metric(DistanceMetric::Cosine)
    }

    /// Create a new empty store with a fixed metric.
    #[must_use]
    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self {
            metric,
            dimension: None,
            entries: HashMap::new(),
        }
    }

    /// Dimension of stored vectors, fixed by the first insert.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for MemoryStore {
    fn insert(&mut self, documents: &[Document], embeddings: &[Embedding]) -> Result<()> {
        if documents.len() != embeddings.len() {
            return Err(Error::InvalidInput(format!(
                "{} documents but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        let Some(expected) = self.dimension.or_else(|| embeddings.first().map(Vec::len)) else {
            return Ok(());
        };
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(Error::Store(format!(
                "embedding dimension {} does not match store dimension {expected}",
                bad.len()
            )));
        }

        self.dimension = Some(expected);
        for (document, embedding) in documents.iter().zip(embeddings) {
            self.entries
                .insert(document.id.clone(), (document.clone(), embedding.clone()));
        }
        Ok(())
    }

    fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if let Some(dimension) = self.dimension {
            if query_embedding.len() != dimension {
                return Err(Error::Store(format!(
                    "query dimension {} does not match store dimension {dimension}",
                    query_embedding.len()
                )));
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        // max-heap on distance: the root is the worst of the current top-k
        let mut heap = BinaryHeap::with_capacity(k.min(self.entries.len()).saturating_add(1));
        for (document, embedding) in self.entries.values() {
            heap.push(ScoredDocument {
                document: document.clone(),
                distance: self.metric.distance(query_embedding, embedding),
            });
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap.into_sorted_vec())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
    }
}
