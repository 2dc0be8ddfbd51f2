//! Relevance reranking
//!
//! Second stage of two-stage retrieval: every candidate is scored together
//! with the original query by a [`RelevanceScorer`] (a cross-encoder), and the
//! best `return_n` are kept.
//!
//! Scores are only meaningful relative to each other within one call. They are
//! never compared against fixed thresholds or across searches.
//!
//! Reranking is skipped, and candidates come back in distance order, when:
//! - reranking is disabled or no scorer is configured
//! - there are fewer than two candidates
//! - the best candidate is already closer than `high_confidence_distance`

use std::sync::Arc;

use async_trait::async_trait;

use crate::candidate::{Candidate, CandidateSet};
use crate::config::PipelineConfig;
use crate::error::Collaborator;
use crate::query::Query;
use crate::result::{Degradation, Ranking};
use crate::{Error, Result};

/// Pairwise (query, document) relevance model.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score each document against the query, one score per document, in order.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: RelevanceScorer + ?Sized> RelevanceScorer for Arc<T> {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        (**self).score(query, documents).await
    }
}

/// Placeholder for pipelines built without a scorer.
pub struct NoScorer;

#[async_trait]
impl RelevanceScorer for NoScorer {
    async fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
        Err(Error::unavailable(
            Collaborator::RelevanceScorer,
            "no scorer configured",
        ))
    }
}

/// Why reranking did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoScorer,
    TooFewCandidates,
    HighConfidence,
}

/// Ordered output of the rerank stage
#[derive(Debug, Clone)]
pub struct Reranked {
    /// At most `return_n` candidates
    pub candidates: Vec<Candidate>,
    pub ranking: Ranking,
    pub degradation: Option<Degradation>,
}

impl Reranked {
    fn by_distance(set: CandidateSet, return_n: usize, degradation: Option<Degradation>) -> Self {
        let mut candidates = set.into_sorted_by_distance();
        candidates.truncate(return_n);
        Self {
            candidates,
            ranking: Ranking::Distance,
            degradation,
        }
    }
}

/// Reorders a candidate set with an optional [`RelevanceScorer`].
pub struct Reranker<R: RelevanceScorer> {
    scorer: Option<R>,
}

impl Reranker<NoScorer> {
    /// A reranker that always passes candidates through in distance order.
    #[must_use]
    pub fn disabled() -> Self {
        Self { scorer: None }
    }
}

impl<R: RelevanceScorer> Reranker<R> {
    #[must_use]
    pub fn new(scorer: R) -> Self {
        Self {
            scorer: Some(scorer),
        }
    }

    /// Decide whether this set should be scored at all.
    #[must_use]
    pub fn skip_reason(&self, set: &CandidateSet, config: &PipelineConfig) -> Option<SkipReason> {
        if !config.enable_reranking {
            return Some(SkipReason::Disabled);
        }
        if self.scorer.is_none() {
            return Some(SkipReason::NoScorer);
        }
        if set.len() < 2 {
            return Some(SkipReason::TooFewCandidates);
        }
        match set.best_distance() {
            Some(best) if best < config.high_confidence_distance => {
                Some(SkipReason::HighConfidence)
            }
            _ => None,
        }
    }

    /// Score and order the set against the original query.
    ///
    /// Returns `min(return_n, set.len())` candidates, each from the input,
    /// none twice. Never fails: a scorer error, a wrong number of scores, or a
    /// non-finite score falls back to distance order with a [`Degradation`].
    pub async fn rerank(&self, query: &Query, set: CandidateSet, config: &PipelineConfig) -> Reranked {
        let return_n = config.return_n;

        let scorer = match (self.skip_reason(&set, config), &self.scorer) {
            (None, Some(scorer)) => scorer,
            (reason, _) => {
                tracing::debug!(query_id = %query.id(), ?reason, "reranking skipped");
                return Reranked::by_distance(set, return_n, None);
            }
        };

        // distance order first so the final sort only has to break ties by distance
        let mut candidates = set.into_sorted_by_distance();
        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();

        let scores = match scorer.score(query.text(), &documents).await {
            Ok(scores) => check_scores(scores, candidates.len()),
            Err(e) => Err(e),
        };

        let scores = match scores {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!(query_id = %query.id(), error = %e, "reranking degraded");
                candidates.truncate(return_n);
                return Reranked {
                    candidates,
                    ranking: Ranking::Distance,
                    degradation: Some(Degradation::Reranking {
                        reason: e.to_string(),
                    }),
                };
            }
        };

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.relevance = Some(score);
        }
        candidates.sort_by(|a, b| {
            let a_score = a.relevance.unwrap_or(f32::NEG_INFINITY);
            let b_score = b.relevance.unwrap_or(f32::NEG_INFINITY);
            b_score
                .total_cmp(&a_score)
                .then_with(|| a.distance.total_cmp(&b.distance))
        });
        candidates.truncate(return_n);

        tracing::debug!(query_id = %query.id(), kept = candidates.len(), "reranked candidates");
        Reranked {
            candidates,
            ranking: Ranking::Relevance,
            degradation: None,
        }
    }
}

fn check_scores(scores: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if scores.len() != expected {
        return Err(Error::Reranking(format!(
            "scorer returned {} scores for {expected} documents",
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(Error::Reranking("scorer returned a non-finite score".to_string()));
    }
    Ok(scores)
}

mod bge;

pub use bge::*;
