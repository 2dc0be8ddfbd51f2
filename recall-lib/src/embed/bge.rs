use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embed::{Embedder, Embedding};
use crate::{Error, Result};

const QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// BGE embedder backed by fastembed.
///
/// Defaults to BAAI/bge-small-en-v1.5 (384 dimensions, 512 tokens per input).
pub struct BgeEmbedder {
    model: TextEmbedding,
    name: &'static str,
    dimension: usize,
}

impl BgeEmbedder {
    /// Create the small BGE embedder.
    ///
    /// Downloads the model on first use (~130MB).
    pub fn new() -> Result<Self> {
        Self::load(EmbeddingModel::BGESmallENV15, "BAAI/bge-small-en-v1.5", 384)
    }

    /// Create the large BGE embedder (1024 dimensions).
    ///
    /// Downloads the model on first use (~1.2GB).
    pub fn large() -> Result<Self> {
        Self::load(EmbeddingModel::BGELargeENV15, "BAAI/bge-large-en-v1.5", 1024)
    }

    fn load(model: EmbeddingModel, name: &'static str, dimension: usize) -> Result<Self> {
        let opts = InitOptions::new(model).with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model,
                name,
                dimension,
            })
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

impl Embedder for BgeEmbedder {
    fn model_name(&self) -> &str {
        self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.model
            .embed(texts, None)
            .map_err(|e| Error::Embedding(e.to_string()))
    }

    fn embed_query(&mut self, text: &str) -> Result<Embedding> {
        let query_text = format!("{QUERY_PREFIX}{text}");

        self.model
            .embed(vec![query_text], None)
            .map_err(|e| Error::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }
}
