//! Error types for recall

use std::time::Duration;

use thiserror::Error;

/// Result type alias for recall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in recall operations
#[derive(Error, Debug)]
pub enum Error {
    /// Pipeline configuration is invalid. Raised before any external call.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external collaborator (index, generator, scorer) could not complete
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: Collaborator,
        reason: String,
    },

    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to store or retrieve from vector store
    #[error("store error: {0}")]
    Store(String),

    /// Text generation failed or produced nothing usable
    #[error("generation error: {0}")]
    Generation(String),

    /// Failed to load or run the reranking model
    #[error("reranking error: {0}")]
    Reranking(String),

    /// Failed to split or load a document
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The request was cancelled by the caller
    #[error("search cancelled")]
    Cancelled,

    /// The request exceeded its deadline
    #[error("search timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps any collaborator failure as [`Error::Unavailable`].
    pub fn unavailable(collaborator: Collaborator, reason: impl ToString) -> Self {
        Self::Unavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }
}

/// The external capability a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    VectorIndex,
    TextGenerator,
    RelevanceScorer,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::VectorIndex => "vector index",
            Self::TextGenerator => "text generator",
            Self::RelevanceScorer => "relevance scorer",
        };
        f.write_str(name)
    }
}
