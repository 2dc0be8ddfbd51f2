//! Query expansion
//!
//! Turns one user query into several phrasings to widen recall. The original
//! query is always the first variant. Generation goes through a
//! [`TextGenerator`]; if it fails the search carries on with the original
//! query alone.
//!
//! Expansion is skipped for:
//! - queries of two tokens or fewer
//! - structured input (SQL statements, commands with `--flags`, call syntax,
//!   quoted exact phrases)
//!
//! # Usage
//!
//! ```ignore
//! use recall_lib::expand::{OllamaGenerator, QueryExpander};
//!
//! let expander = QueryExpander::new(OllamaGenerator::new(OllamaConfig::default())?);
//! let expansion = expander.expand(&query, &config).await;
//! for variant in &expansion.variants { /* retrieve */ }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::config::PipelineConfig;
use crate::error::Collaborator;
use crate::query::Query;
use crate::result::Degradation;
use crate::{Error, Result};

/// Free-form text generation (an LLM behind some API).
///
/// No determinism is assumed; callers must tolerate failures and timeouts.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Placeholder for pipelines built without a generator.
pub struct NoGenerator;

#[async_trait]
impl TextGenerator for NoGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::unavailable(
            Collaborator::TextGenerator,
            "no generator configured",
        ))
    }
}

/// Query variants to retrieve with, plus any absorbed failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Never empty; the original query text comes first
    pub variants: Vec<String>,
    pub degradations: Vec<Degradation>,
}

impl Expansion {
    pub(crate) fn original(query: &Query) -> Self {
        Self {
            variants: vec![query.text().to_string()],
            degradations: Vec::new(),
        }
    }
}

/// Why a query was not expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    TooShort,
    Structured,
}

/// Decide whether a query should be expanded at all.
#[must_use]
pub fn skip_reason(query: &Query, config: &PipelineConfig) -> Option<SkipReason> {
    if !config.enable_expansion && !config.enable_hyde {
        Some(SkipReason::Disabled)
    } else if query.token_count() <= 2 {
        Some(SkipReason::TooShort)
    } else if is_structured(query.text()) {
        Some(SkipReason::Structured)
    } else {
        None
    }
}

/// Returns `true` if the text reads like a formal command rather than prose.
#[must_use]
pub fn is_structured(text: &str) -> bool {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    let patterns = PATTERNS.get_or_init(|| {
        [
            // SQL statements
            r"(?i)^\s*(select\s+.+\s+from\s|insert\s+into\s|update\s+\S+\s+set\s|delete\s+from\s|exec(ute)?\s+\w+|(create|alter|drop)\s+(table|view|procedure|index)\s)",
            // command lines with long flags
            r"(^|\s)--[A-Za-z][\w-]*(=\S+)?(\s|$)",
            // call syntax and paths
            r"[A-Za-z_]\w*\([^)]*\)|\w::\w",
            // a fully quoted phrase asks for an exact match
            r#"^\s*"[^"]+"\s*$"#,
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("expansion patterns are valid"))
        .collect()
    });

    patterns.iter().any(|re| re.is_match(text))
}

/// Prompt asking for `count` alternative phrasings, one per line.
#[must_use]
pub fn expansion_prompt(query: &str, count: usize) -> String {
    format!(
        "Rewrite the search query below in {count} different ways. Each rewrite should use \
         different vocabulary or a different perspective: describe the symptom instead of the \
         fix or the fix instead of the symptom, or use a more specific or more general term.\n\
         Reply with one rewrite per line and nothing else.\n\n\
         Query: {query}"
    )
}

/// Prompt asking for a short passage that would answer the query.
#[must_use]
pub fn hyde_prompt(query: &str) -> String {
    format!(
        "Write a short passage of two or three sentences that answers the question below, \
         as it might appear in a troubleshooting guide. Reply with the passage only.\n\n\
         Question: {query}"
    )
}

/// Pull usable phrasings out of generator output.
///
/// List markers and surrounding quotes are stripped; blank lines, preamble
/// lines ending in `:`, and repeats (case-insensitive, including the original)
/// are dropped. At most `limit` phrasings are returned.
#[must_use]
pub fn parse_variants(output: &str, original: &str, limit: usize) -> Vec<String> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]+|\d+[.):]|\(\d+\))\s*").expect("marker pattern is valid")
    });

    let mut seen: HashSet<String> = HashSet::from([original.trim().to_lowercase()]);
    let mut variants = Vec::new();

    for line in output.lines() {
        let line = marker.replace(line, "");
        let line = line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        if seen.insert(line.to_lowercase()) {
            variants.push(line.to_string());
        }
        if variants.len() == limit {
            break;
        }
    }

    variants
}

/// Generates query variants with a [`TextGenerator`].
pub struct QueryExpander<G: TextGenerator> {
    generator: G,
}

impl<G: TextGenerator> QueryExpander<G> {
    #[must_use]
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Expand a query into retrieval variants.
    ///
    /// Never fails: generator errors and unusable output reduce the result to
    /// the original query and are reported as [`Degradation`]s.
    pub async fn expand(&self, query: &Query, config: &PipelineConfig) -> Expansion {
        let mut expansion = Expansion::original(query);

        if let Some(reason) = skip_reason(query, config) {
            tracing::debug!(query_id = %query.id(), ?reason, "expansion skipped");
            return expansion;
        }

        if config.enable_expansion {
            let count = config.expansion_variant_count;
            match self.rephrase(query, count).await {
                Ok(variants) => expansion.variants.extend(variants),
                Err(e) => {
                    tracing::warn!(query_id = %query.id(), error = %e, "query expansion degraded");
                    expansion.degradations.push(Degradation::Expansion {
                        reason: e.to_string(),
                    });
                }
            }
        }

        if config.enable_hyde {
            match self.hypothetical_answer(query).await {
                Ok(passage) => {
                    if !expansion.variants.contains(&passage) {
                        expansion.variants.push(passage);
                    }
                }
                Err(e) => {
                    tracing::warn!(query_id = %query.id(), error = %e, "hypothetical answer degraded");
                    expansion.degradations.push(Degradation::Hyde {
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            query_id = %query.id(),
            variants = expansion.variants.len(),
            "query expanded"
        );
        expansion
    }

    async fn rephrase(&self, query: &Query, count: usize) -> Result<Vec<String>> {
        let output = self
            .generator
            .generate(&expansion_prompt(query.text(), count))
            .await?;

        let variants = parse_variants(&output, query.text(), count);
        if variants.is_empty() {
            return Err(Error::Generation("no usable phrasings in output".to_string()));
        }
        Ok(variants)
    }

    async fn hypothetical_answer(&self, query: &Query) -> Result<String> {
        let output = self.generator.generate(&hyde_prompt(query.text())).await?;
        let passage = output.trim();
        if passage.is_empty() {
            return Err(Error::Generation("empty passage".to_string()));
        }
        Ok(passage.to_string())
    }

    /// Returns a reference to the generator.
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }
}

mod ollama;

pub use ollama::*;
