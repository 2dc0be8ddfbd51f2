use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::candidate::Candidate;

/// How a [`SearchResult`] is ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    /// Descending reranker score, ties by ascending distance
    Relevance,
    /// Ascending retrieval distance
    Distance,
}

/// A collaborator failure that was absorbed instead of failing the search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Degradation {
    /// Query expansion failed; only the original query was used
    Expansion { reason: String },
    /// Hypothetical answer generation failed; no passage variant was used
    Hyde { reason: String },
    /// Retrieval for one variant failed; that variant contributed nothing
    Retrieval { variant: String, reason: String },
    /// Reranking failed; results are in distance order
    Reranking { reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expansion { reason } => write!(f, "query expansion skipped: {reason}"),
            Self::Hyde { reason } => write!(f, "hypothetical answer skipped: {reason}"),
            Self::Retrieval { variant, reason } => {
                write!(f, "retrieval failed for {variant:?}: {reason}")
            }
            Self::Reranking { reason } => write!(f, "reranking skipped: {reason}"),
        }
    }
}

/// What a caller should tell the user about a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// At least one result
    Found,
    /// Nothing passed the filters, and every collaborator answered
    NothingRelevant,
    /// No results and at least one collaborator failed
    Degraded,
}

/// The ordered outcome of one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Id of the query this answers
    pub query_id: Uuid,
    /// Results, at most `return_n`
    pub candidates: Vec<Candidate>,
    /// Ordering key of `candidates`
    pub ranking: Ranking,
    /// Query variants that were retrieved, original first
    pub variants: Vec<String>,
    /// Collaborator failures absorbed along the way
    pub degradations: Vec<Degradation>,
}

impl SearchResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    #[must_use]
    pub fn status(&self) -> SearchStatus {
        match (self.is_empty(), self.is_degraded()) {
            (false, _) => SearchStatus::Found,
            (true, false) => SearchStatus::NothingRelevant,
            (true, true) => SearchStatus::Degraded,
        }
    }

    /// Document ids in result order.
    #[must_use]
    pub fn doc_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.doc_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(candidates: Vec<Candidate>, degradations: Vec<Degradation>) -> SearchResult {
        SearchResult {
            query_id: Uuid::new_v4(),
            candidates,
            ranking: Ranking::Distance,
            variants: vec!["q".to_string()],
            degradations,
        }
    }

    #[test]
    fn test_status_distinguishes_empty_from_degraded() {
        let empty = make_result(vec![], vec![]);
        assert_eq!(empty.status(), SearchStatus::NothingRelevant);

        let degraded = make_result(
            vec![],
            vec![Degradation::Retrieval {
                variant: "q".to_string(),
                reason: "offline".to_string(),
            }],
        );
        assert_eq!(degraded.status(), SearchStatus::Degraded);

        let found = make_result(
            vec![Candidate::new("d", "", 0.1)],
            vec![Degradation::Reranking {
                reason: "offline".to_string(),
            }],
        );
        assert_eq!(found.status(), SearchStatus::Found);
        assert!(found.is_degraded());
    }

    #[test]
    fn test_degradation_serializes_with_stage_tag() {
        let json = serde_json::to_value(Degradation::Reranking {
            reason: "model unavailable".to_string(),
        })
        .unwrap();
        assert_eq!(json["stage"], "reranking");
        assert_eq!(json["reason"], "model unavailable");
    }
}
