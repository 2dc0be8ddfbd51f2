//! Search pipeline
//!
//! Runs one search through every stage:
//!
//! ```text
//! Query -> Retriever (original) -> Expander -> Retriever (per variant, concurrent) -> Merge -> Reranker -> SearchResult
//! ```
//!
//! The expander is skipped when the original query already has a match
//! closer than `high_confidence_distance`.
//!
//! Collaborator failures are absorbed into [`Degradation`] records on the
//! result. Only invalid configuration, invalid input, cancellation and
//! timeouts reach the caller as errors.
//!
//! # Usage
//!
//! ```ignore
//! use recall_lib::pipeline::Pipeline;
//!
//! // Retrieval only
//! let pipeline = Pipeline::new(index, PipelineConfig::default())?;
//! let result = pipeline.search("cashier can't void an order").await?;
//!
//! // Expansion and reranking
//! let pipeline = Pipeline::new(index, config)?
//!     .with_reranker(BgeReranker::new()?)
//!     .with_expansion(OllamaGenerator::new(OllamaConfig::default())?);
//! let result = pipeline.search("cashier can't void an order").await?;
//! ```

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;

use crate::candidate::Candidate;
use crate::config::PipelineConfig;
use crate::expand::{Expansion, NoGenerator, QueryExpander, TextGenerator};
use crate::index::VectorIndex;
use crate::merge::merge;
use crate::query::Query;
use crate::rerank::{NoScorer, RelevanceScorer, Reranker};
use crate::result::{Degradation, SearchResult};
use crate::retrieve::Retriever;
use crate::{Error, Result};

/// Retrieval pipeline over an index, with optional reranking and expansion.
pub struct Pipeline<I: VectorIndex, R: RelevanceScorer = NoScorer, G: TextGenerator = NoGenerator> {
    config: PipelineConfig,
    retriever: Retriever<I>,
    reranker: Reranker<R>,
    expander: Option<QueryExpander<G>>,
}

// Constructor for retrieval-only pipelines
impl<I: VectorIndex> Pipeline<I, NoScorer, NoGenerator> {
    /// Create a pipeline without reranking or expansion.
    ///
    /// The config is validated here, before any collaborator is called.
    pub fn new(index: I, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            retriever: Retriever::new(index),
            reranker: Reranker::disabled(),
            expander: None,
        })
    }
}

impl<I: VectorIndex, R: RelevanceScorer, G: TextGenerator> Pipeline<I, R, G> {
    /// Score candidates with `scorer` when reranking is enabled.
    #[must_use]
    pub fn with_reranker<S: RelevanceScorer>(self, scorer: S) -> Pipeline<I, S, G> {
        Pipeline {
            config: self.config,
            retriever: self.retriever,
            reranker: Reranker::new(scorer),
            expander: self.expander,
        }
    }

    /// Generate query variants with `generator` when expansion is enabled.
    #[must_use]
    pub fn with_expansion<T: TextGenerator>(self, generator: T) -> Pipeline<I, R, T> {
        Pipeline {
            config: self.config,
            retriever: self.retriever,
            reranker: self.reranker,
            expander: Some(QueryExpander::new(generator)),
        }
    }

    /// Search, honoring `timeout_ms` from the config if set.
    pub async fn search(&self, text: &str) -> Result<SearchResult> {
        let query = Query::new(text)?;
        self.run_with_deadline(query, self.config.timeout()).await
    }

    /// Search with an explicit deadline, overriding the configured one.
    ///
    /// On expiry every in-flight collaborator call is dropped and
    /// [`Error::TimedOut`] is returned; no partial result is produced.
    pub async fn search_with_timeout(&self, text: &str, timeout: Duration) -> Result<SearchResult> {
        let query = Query::new(text)?;
        self.run_with_deadline(query, Some(timeout)).await
    }

    /// Search until done or until `true` is sent on `shutdown`.
    ///
    /// A cancelled search returns [`Error::Cancelled`]; the configured timeout
    /// still applies. Dropping the sender never cancels.
    pub async fn search_cancellable(
        &self,
        text: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SearchResult> {
        let query = Query::new(text)?;
        let query_id = query.id();

        let cancelled = async move {
            if shutdown.wait_for(|&stop| stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            () = cancelled => {
                tracing::info!(%query_id, "search cancelled");
                Err(Error::Cancelled)
            }
            result = self.run_with_deadline(query, self.config.timeout()) => result,
        }
    }

    async fn run_with_deadline(&self, query: Query, deadline: Option<Duration>) -> Result<SearchResult> {
        let Some(deadline) = deadline else {
            return Ok(self.run(query).await);
        };

        let query_id = query.id();
        tokio::time::timeout(deadline, self.run(query))
            .await
            .map_err(|_| {
                tracing::warn!(%query_id, ?deadline, "search timed out");
                Error::TimedOut(deadline)
            })
    }

    async fn run(&self, query: Query) -> SearchResult {
        let config = &self.config;
        let threshold = config.retrieval_threshold();
        tracing::debug!(query_id = %query.id(), query = query.text(), threshold, "search started");

        let (original, failure) = self.retrieve_variant(query.text(), threshold).await;
        let mut degradations: Vec<Degradation> = failure.into_iter().collect();

        // a confident original match is never expanded
        let confident = original
            .first()
            .is_some_and(|best| best.distance < config.high_confidence_distance);
        let expansion = match &self.expander {
            Some(_) if confident => {
                tracing::debug!(query_id = %query.id(), "confident match, expansion skipped");
                Expansion::original(&query)
            }
            Some(expander) => expander.expand(&query, config).await,
            None => Expansion::original(&query),
        };
        degradations.extend(expansion.degradations);

        let mut variants = vec![query.text().to_string()];
        let mut per_variant = vec![original];

        let extra = &expansion.variants[1..];
        if !extra.is_empty() {
            let results = join_all(extra.iter().map(|v| self.retrieve_variant(v, threshold))).await;
            for (variant, (candidates, failure)) in extra.iter().zip(results) {
                variants.push(variant.clone());
                per_variant.push(candidates);
                degradations.extend(failure);
            }
        }

        let set = merge(per_variant);
        let merged = set.len();

        let reranked = self.reranker.rerank(&query, set, config).await;
        degradations.extend(reranked.degradation);

        let mut candidates = reranked.candidates;
        let strict = config.distance_threshold();
        if threshold > strict {
            candidates.retain(|c| c.distance <= strict);
        }

        let result = SearchResult {
            query_id: query.id(),
            candidates,
            ranking: reranked.ranking,
            variants,
            degradations,
        };

        tracing::info!(
            query_id = %result.query_id,
            variants = result.variants.len(),
            merged,
            returned = result.len(),
            ranking = ?result.ranking,
            degraded = result.degradations.len(),
            "search finished"
        );
        result
    }

    /// Retrieve one variant. Index failures become an empty list plus a degradation.
    async fn retrieve_variant(
        &self,
        variant: &str,
        threshold: f32,
    ) -> (Vec<Candidate>, Option<Degradation>) {
        match self
            .retriever
            .retrieve(variant, self.config.retrieve_k, threshold)
            .await
        {
            Ok(candidates) => (candidates, None),
            Err(e) => {
                tracing::warn!(variant, error = %e, "retrieval degraded");
                (
                    Vec::new(),
                    Some(Degradation::Retrieval {
                        variant: variant.to_string(),
                        reason: e.to_string(),
                    }),
                )
            }
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns a reference to the index.
    #[must_use]
    pub fn index(&self) -> &I {
        self.retriever.index()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::result::{Ranking, SearchStatus};
    use crate::testing::{hit, FakeGenerator, FakeIndex, FakeScorer};

    const QUERY: &str = "cashier can't void order";

    fn base_config() -> PipelineConfig {
        PipelineConfig {
            retrieve_k: 10,
            return_n: 3,
            distance_threshold: Some(0.40),
            enable_reranking: false,
            ..PipelineConfig::default()
        }
    }

    fn expansion_config() -> PipelineConfig {
        PipelineConfig {
            enable_expansion: true,
            expansion_variant_count: 1,
            ..base_config()
        }
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_call() {
        let index = Arc::new(FakeIndex::new());
        let config = PipelineConfig {
            retrieve_k: 1,
            return_n: 3,
            ..PipelineConfig::default()
        };

        let result = Pipeline::new(Arc::clone(&index), config);

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let index = Arc::new(FakeIndex::new());
        let pipeline = Pipeline::new(Arc::clone(&index), base_config()).unwrap();

        let result = pipeline.search("   ").await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_then_distance_order() {
        let index = FakeIndex::new().with_hits(
            "void order",
            vec![hit("D1", 0.10), hit("D2", 0.30), hit("D3", 0.45)],
        );
        let pipeline = Pipeline::new(index, base_config()).unwrap();

        let result = pipeline.search("void order").await.unwrap();

        assert_eq!(result.doc_ids(), vec!["D1", "D2"]);
        assert_eq!(result.ranking, Ranking::Distance);
        assert_eq!(result.status(), SearchStatus::Found);
    }

    #[tokio::test]
    async fn test_nothing_relevant_is_not_an_error() {
        let index = FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.90)]);
        let pipeline = Pipeline::new(index, base_config()).unwrap();

        let result = pipeline.search(QUERY).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.status(), SearchStatus::NothingRelevant);
    }

    #[tokio::test]
    async fn test_index_failure_is_degraded_empty_result() {
        let pipeline = Pipeline::new(FakeIndex::new().failing(), base_config())
            .unwrap()
            .with_reranker(FakeScorer::new());

        let result = pipeline.search(QUERY).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.status(), SearchStatus::Degraded);
        assert!(matches!(
            result.degradations.as_slice(),
            [Degradation::Retrieval { .. }]
        ));
    }

    #[tokio::test]
    async fn test_variants_merged_with_best_distance() {
        let index = FakeIndex::new()
            .with_hits(QUERY, vec![hit("D1", 0.20), hit("D2", 0.50)])
            .with_hits("void button disabled", vec![hit("D1", 0.15), hit("D3", 0.30)]);
        let pipeline = Pipeline::new(index, expansion_config())
            .unwrap()
            .with_expansion(FakeGenerator::replying("void button disabled"));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.variants, vec![QUERY, "void button disabled"]);
        assert_eq!(result.doc_ids(), vec!["D1", "D3"]);
        assert!((result.candidates[0].distance - 0.15).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_variant_failure_keeps_other_variants() {
        let index = FakeIndex::new()
            .with_hits(QUERY, vec![hit("D1", 0.20)])
            .failing_for("void button disabled");
        let pipeline = Pipeline::new(index, expansion_config())
            .unwrap()
            .with_expansion(FakeGenerator::replying("void button disabled"));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.doc_ids(), vec!["D1"]);
        assert_eq!(result.status(), SearchStatus::Found);
        assert!(matches!(
            result.degradations.as_slice(),
            [Degradation::Retrieval { variant, .. }] if variant == "void button disabled"
        ));
    }

    #[tokio::test]
    async fn test_expansion_failure_is_absorbed() {
        let index = FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.20)]);
        let pipeline = Pipeline::new(index, expansion_config())
            .unwrap()
            .with_expansion(FakeGenerator::failing());

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.variants, vec![QUERY]);
        assert_eq!(result.doc_ids(), vec!["D1"]);
        assert!(matches!(
            result.degradations.as_slice(),
            [Degradation::Expansion { .. }]
        ));
    }

    #[tokio::test]
    async fn test_confident_original_drops_expansion_variants() {
        let index = Arc::new(
            FakeIndex::new()
                .with_hits(QUERY, vec![hit("D1", 0.05)])
                .with_hits("void button disabled", vec![hit("D9", 0.10)]),
        );
        let pipeline = Pipeline::new(Arc::clone(&index), expansion_config())
            .unwrap()
            .with_expansion(FakeGenerator::replying("void button disabled"));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.variants, vec![QUERY]);
        assert_eq!(result.doc_ids(), vec!["D1"]);
        assert_eq!(index.calls(), 1);
    }

    #[tokio::test]
    async fn test_confident_original_never_calls_generator() {
        let index = FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.05)]);
        let generator = Arc::new(FakeGenerator::failing());
        let pipeline = Pipeline::new(index, expansion_config())
            .unwrap()
            .with_expansion(Arc::clone(&generator));

        let result = pipeline.search(QUERY).await.unwrap();

        assert!(generator.prompts().is_empty());
        assert!(result.degradations.is_empty());
        assert_eq!(result.status(), SearchStatus::Found);
    }

    #[tokio::test]
    async fn test_unconfident_original_is_expanded() {
        let index = FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.30)]);
        let generator = Arc::new(FakeGenerator::replying("void button disabled"));
        let pipeline = Pipeline::new(index, expansion_config())
            .unwrap()
            .with_expansion(Arc::clone(&generator));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(generator.prompts().len(), 1);
        assert_eq!(result.variants, vec![QUERY, "void button disabled"]);
    }

    #[tokio::test]
    async fn test_variants_retrieved_concurrently() {
        let index = Arc::new(
            FakeIndex::new()
                .with_hits(QUERY, vec![hit("D1", 0.30)])
                .with_delay(Duration::from_millis(20)),
        );
        let config = PipelineConfig {
            expansion_variant_count: 3,
            ..expansion_config()
        };
        let pipeline = Pipeline::new(Arc::clone(&index), config)
            .unwrap()
            .with_expansion(FakeGenerator::replying("first\nsecond\nthird"));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.variants.len(), 4);
        assert_eq!(index.calls(), 4);
        assert!(index.max_in_flight() >= 3);
    }

    #[tokio::test]
    async fn test_reranking_reorders_by_score() {
        let index = FakeIndex::new().with_hits(
            QUERY,
            vec![hit("D1", 0.20), hit("D2", 0.25), hit("D3", 0.35)],
        );
        let config = PipelineConfig {
            enable_reranking: true,
            return_n: 2,
            ..base_config()
        };
        let pipeline = Pipeline::new(index, config)
            .unwrap()
            .with_reranker(FakeScorer::new().with_score("D3", 4.0).with_score("D1", 1.0));

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.doc_ids(), vec!["D3", "D1"]);
        assert_eq!(result.ranking, Ranking::Relevance);
    }

    #[tokio::test]
    async fn test_scorer_failure_degrades_to_distance_order() {
        let index = FakeIndex::new().with_hits(
            QUERY,
            vec![hit("D2", 0.30), hit("D1", 0.20), hit("D3", 0.35)],
        );
        let config = PipelineConfig {
            enable_reranking: true,
            ..base_config()
        };
        let pipeline = Pipeline::new(index, config)
            .unwrap()
            .with_reranker(FakeScorer::new().failing());

        let result = pipeline.search(QUERY).await.unwrap();

        assert_eq!(result.doc_ids(), vec!["D1", "D2", "D3"]);
        assert_eq!(result.status(), SearchStatus::Found);
        assert!(matches!(
            result.degradations.as_slice(),
            [Degradation::Reranking { .. }]
        ));
    }

    #[tokio::test]
    async fn test_relaxed_threshold_rechecked_after_rerank() {
        let index = FakeIndex::new().with_hits(
            QUERY,
            vec![hit("D1", 0.30), hit("D2", 0.45), hit("D3", 0.55)],
        );
        let config = PipelineConfig {
            enable_reranking: true,
            rerank_threshold_slack: 0.10,
            ..base_config()
        };
        let scorer = Arc::new(FakeScorer::new().with_score("D2", 3.0).with_score("D1", 1.0));
        let pipeline = Pipeline::new(index, config)
            .unwrap()
            .with_reranker(Arc::clone(&scorer));

        let result = pipeline.search(QUERY).await.unwrap();

        // D2 reached the scorer through the relaxed threshold, then failed the strict one
        assert_eq!(scorer.calls(), 1);
        assert_eq!(result.doc_ids(), vec!["D1"]);
    }

    #[tokio::test]
    async fn test_timeout_returns_no_result() {
        let index = FakeIndex::new()
            .with_hits(QUERY, vec![hit("D1", 0.2)])
            .with_delay(Duration::from_millis(500));
        let pipeline = Pipeline::new(index, base_config()).unwrap();

        let result = pipeline
            .search_with_timeout(QUERY, Duration::from_millis(20))
            .await;

        assert!(matches!(result, Err(Error::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_configured_timeout_applies_to_search() {
        let index = FakeIndex::new().with_delay(Duration::from_millis(500));
        let config = PipelineConfig {
            timeout_ms: Some(20),
            ..base_config()
        };
        let pipeline = Pipeline::new(index, config).unwrap();

        assert!(matches!(pipeline.search(QUERY).await, Err(Error::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_cancelled_search() {
        let index = FakeIndex::new()
            .with_hits(QUERY, vec![hit("D1", 0.2)])
            .with_delay(Duration::from_millis(500));
        let pipeline = Pipeline::new(index, base_config()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = shutdown_tx.send(true);
        });

        let result = pipeline.search_cancellable(QUERY, shutdown_rx).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_search_calls_nothing() {
        let index = Arc::new(FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.2)]));
        let pipeline = Pipeline::new(Arc::clone(&index), base_config()).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        let result = pipeline.search_cancellable(QUERY, shutdown_rx).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn test_uncancelled_search_completes() {
        let index = FakeIndex::new().with_hits(QUERY, vec![hit("D1", 0.2)]);
        let pipeline = Pipeline::new(index, base_config()).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let result = pipeline.search_cancellable(QUERY, shutdown_rx).await.unwrap();
        assert_eq!(result.doc_ids(), vec!["D1"]);
    }
}
