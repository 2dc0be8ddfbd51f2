//! Text embedding using local models
//!
//! Uses BAAI/bge-*-en-v1.5 via the fastembed crate (ONNX runtime). Embeddings
//! only matter to the local [`EmbeddedIndex`](crate::index::EmbeddedIndex); the
//! pipeline itself works on text.
//!
//! # Usage
//!
//! ```ignore
//! use recall_lib::embed::{BgeEmbedder, Embedder};
//!
//! let mut embedder = BgeEmbedder::new()?;
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["Voiding an order...", "Printer setup..."])?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("cashier can't void")?;
//! ```

use crate::Result;

/// Dense vector produced by an [`Embedder`]
pub type Embedding = Vec<f32>;

/// Bi-encoder that maps text to fixed-dimension vectors.
///
/// Takes `&mut self` because ONNX sessions are not shareable;
/// [`EmbeddedIndex`](crate::index::EmbeddedIndex) serialises access.
pub trait Embedder: Send + Sync {
    /// Embed passages for storage, batched by the model.
    fn embed_documents(&mut self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a search query. Asymmetric models add their query instruction here.
    fn embed_query(&mut self, text: &str) -> Result<Embedding>;

    fn dimension(&self) -> usize;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

mod bge;
pub use bge::*;
