//! Recall - retrieval and reranking library for troubleshooting knowledge bases
//!
//! # Architecture
//!
//! ```text
//! Document -> Splitter -> Embedder -> Store
//!                                      |
//! Query -> Expander -> Retriever <-----+   (one retrieval per variant)
//!                          |
//!                        Merge -> Reranker -> SearchResult
//! ```
//!
//! # Example
//!
//! ```ignore
//! use recall_lib::{
//!     config::PipelineConfig, embed::BgeEmbedder, index::EmbeddedIndex,
//!     ingest::Splitter, pipeline::Pipeline, rerank::BgeReranker, store::MemoryStore,
//! };
//!
//! let index = EmbeddedIndex::new(BgeEmbedder::new()?, MemoryStore::new());
//! index.index(&Splitter::default().load_path("docs/")?)?;
//!
//! let pipeline = Pipeline::new(index, PipelineConfig::default())?
//!     .with_reranker(BgeReranker::new()?);
//! let result = pipeline.search("cashier can't void an order").await?;
//! for candidate in &result.candidates {
//!     println!("{} ({})", candidate.doc_id, candidate.band());
//! }
//! ```

pub mod candidate;
pub mod config;
pub mod embed;
pub mod error;
pub mod expand;
pub mod index;
pub mod ingest;
pub mod merge;
pub mod pipeline;
pub mod query;
pub mod rerank;
pub mod result;
pub mod retrieve;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
