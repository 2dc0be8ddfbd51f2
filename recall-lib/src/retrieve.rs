//! Candidate retrieval
//!
//! A thin wrapper over a [`VectorIndex`]: normalizes raw hits into
//! [`Candidate`]s and drops everything past the distance threshold.

use crate::candidate::{sort_by_distance, Candidate};
use crate::index::VectorIndex;
use crate::Result;

/// Pulls candidates for one query variant from an index.
pub struct Retriever<I: VectorIndex> {
    index: I,
}

impl<I: VectorIndex> Retriever<I> {
    #[must_use]
    pub fn new(index: I) -> Self {
        Self { index }
    }

    /// Retrieve up to `k` candidates for `text`, closest first.
    ///
    /// Hits with a distance above `threshold`, or with a distance that is not
    /// a finite non-negative number, are dropped. An empty index or a fully
    /// filtered result is an empty vec. Index failures are returned as-is.
    pub async fn retrieve(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<Candidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.index.search_nearest(text, k).await?;
        let total = hits.len();

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .filter(|hit| hit.distance.is_finite() && hit.distance >= 0.0)
            .filter(|hit| hit.distance <= threshold)
            .map(|hit| {
                Candidate::new(hit.doc_id, hit.text, hit.distance).with_metadata(hit.metadata)
            })
            .collect();

        // indexes promise ascending order; don't rely on it
        sort_by_distance(&mut candidates);
        candidates.truncate(k);

        tracing::debug!(
            variant = text,
            hits = total,
            kept = candidates.len(),
            threshold,
            "retrieved candidates"
        );
        Ok(candidates)
    }

    /// Returns a reference to the index.
    #[must_use]
    pub fn index(&self) -> &I {
        &self.index
    }
}
