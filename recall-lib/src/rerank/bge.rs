use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

use crate::error::Collaborator;
use crate::rerank::RelevanceScorer;
use crate::{Error, Result};

/// BGE reranker using BAAI/bge-reranker-base.
///
/// Cross-encoder model for two-stage retrieval. Scores query-document pairs
/// together for more accurate relevance ranking than bi-encoder similarity.
/// Inference runs on the blocking pool; the model lock is never held across
/// an `.await`.
pub struct BgeReranker {
    model: Arc<Mutex<TextRerank>>,
}

impl BgeReranker {
    /// Create a new BGE reranker.
    ///
    /// Downloads the model on first use (~300MB).
    pub fn new() -> Result<Self> {
        let opts = RerankInitOptions::new(RerankerModel::BGERerankerBase)
            .with_show_download_progress(true);

        TextRerank::try_new(opts)
            .map(|model| Self {
                model: Arc::new(Mutex::new(model)),
            })
            .map_err(|e| Error::Reranking(e.to_string()))
    }
}

#[async_trait]
impl RelevanceScorer for BgeReranker {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents: Vec<String> = documents.iter().map(|d| (*d).to_string()).collect();

        tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            let results = model
                .lock()
                .map_err(|_| Error::Reranking("reranker lock poisoned".to_string()))?
                .rerank(query.as_str(), &docs, false, None)
                .map_err(|e| Error::unavailable(Collaborator::RelevanceScorer, e))?;

            // results come back sorted by score; put them back in input order
            let mut scores = vec![f32::NAN; docs.len()];
            for result in results {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = result.score;
                }
            }
            Ok(scores)
        })
        .await
        .map_err(|e| Error::unavailable(Collaborator::RelevanceScorer, e))?
    }
}
