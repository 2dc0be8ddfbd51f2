use std::fmt;

use uuid::Uuid;

use crate::{Error, Result};

/// A search request's text plus an id for trace correlation.
///
/// Immutable once created; one `Query` lives for exactly one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    id: Uuid,
    text: String,
}

impl Query {
    /// Create a query with a fresh random id.
    ///
    /// Fails with [`Error::InvalidInput`] if the text is empty or whitespace.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("query text is empty".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text,
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of whitespace-separated tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
