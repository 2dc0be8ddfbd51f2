//! Vector index collaborator
//!
//! The pipeline treats approximate nearest-neighbor search as an opaque
//! capability: text in, nearest documents with distances out. The metric and
//! its range belong to the index and are fixed when it is created.
//!
//! [`EmbeddedIndex`] builds such an index locally from an [`Embedder`] and a
//! [`VectorStore`]; any remote vector database can implement [`VectorIndex`]
//! directly.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::candidate::Metadata;
use crate::embed::Embedder;
use crate::store::{DistanceMetric, Document, VectorStore};
use crate::{Error, Result};

/// A raw hit as returned by an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub doc_id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Distance to the query text under the index metric
    pub distance: f32,
}

/// Nearest-neighbor search over a document corpus.
///
/// Implementations must be safe to call concurrently from several in-flight
/// searches.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` documents nearest to `text`, closest first.
    ///
    /// An empty corpus yields an empty vec, not an error.
    async fn search_nearest(&self, text: &str, k: usize) -> Result<Vec<IndexHit>>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Arc<T> {
    async fn search_nearest(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        (**self).search_nearest(text, k).await
    }
}

/// Local index combining an embedder with a vector store.
///
/// Both are guarded by std locks that are only taken on blocking threads, so
/// no lock is held across an `.await`.
pub struct EmbeddedIndex<E: Embedder, S: VectorStore> {
    embedder: Arc<Mutex<E>>,
    store: Arc<RwLock<S>>,
}

impl<E: Embedder + 'static, S: VectorStore + 'static> EmbeddedIndex<E, S> {
    #[must_use]
    pub fn new(embedder: E, store: S) -> Self {
        Self {
            embedder: Arc::new(Mutex::new(embedder)),
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Embed and store documents. Returns the number indexed.
    pub fn index(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embeddings = self
            .embedder
            .lock()
            .map_err(|_| Error::Embedding("embedder lock poisoned".to_string()))?
            .embed_documents(&texts)?;

        self.store
            .write()
            .map_err(|_| Error::Store("store lock poisoned".to_string()))?
            .insert(documents, &embeddings)?;

        tracing::debug!(count = documents.len(), "indexed documents");
        Ok(documents.len())
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().map_or(0, |store| store.len())
    }

    /// Returns `true` if no documents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metric of the underlying store.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.store
            .read()
            .map_or(DistanceMetric::default(), |store| store.metric())
    }
}

#[async_trait]
impl<E: Embedder + 'static, S: VectorStore + 'static> VectorIndex for EmbeddedIndex<E, S> {
    async fn search_nearest(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let embedder = Arc::clone(&self.embedder);
        let store = Arc::clone(&self.store);
        let text = text.to_string();

        let scored = tokio::task::spawn_blocking(move || {
            let embedding = embedder
                .lock()
                .map_err(|_| Error::Embedding("embedder lock poisoned".to_string()))?
                .embed_query(&text)?;

            store
                .read()
                .map_err(|_| Error::Store("store lock poisoned".to_string()))?
                .search(&embedding, k)
        })
        .await
        .map_err(|e| Error::Store(format!("search task failed: {e}")))??;

        Ok(scored
            .into_iter()
            .map(|s| IndexHit {
                doc_id: s.document.id,
                text: s.document.text,
                metadata: s.document.metadata,
                distance: s.distance,
            })
            .collect())
    }
}
