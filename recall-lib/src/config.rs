//! Pipeline configuration
//!
//! All numeric defaults are starting points, not constants: load overrides
//! from TOML and validate before building a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! ```toml
//! retrieve_k = 20
//! return_n = 3
//! distance_threshold = 0.40
//! enable_reranking = true
//! high_confidence_distance = 0.15
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::DistanceMetric;
use crate::{Error, Result};

/// Options recognised by the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Candidates to pull from the index per query variant
    pub retrieve_k: usize,
    /// Final result count
    pub return_n: usize,
    /// Distance metric of the index, used for default thresholds
    pub metric: DistanceMetric,
    /// Maximum retrieval distance kept. Defaults per metric when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_threshold: Option<f32>,
    /// Generate alternative phrasings of the query
    pub enable_expansion: bool,
    /// Number of alternative phrasings to request
    pub expansion_variant_count: usize,
    /// Also retrieve with a generated hypothetical answer passage
    pub enable_hyde: bool,
    /// Reorder candidates with the relevance scorer
    pub enable_reranking: bool,
    /// Best distance below which expansion and reranking are skipped
    pub high_confidence_distance: f32,
    /// Extra distance allowed at retrieval time when reranking is enabled
    pub rerank_threshold_slack: f32,
    /// Upper bound for the relaxed retrieval threshold
    pub rerank_threshold_cap: f32,
    /// Deadline for a whole search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieve_k: 20,
            return_n: 3,
            metric: DistanceMetric::Cosine,
            distance_threshold: None,
            enable_expansion: false,
            expansion_variant_count: 3,
            enable_hyde: false,
            enable_reranking: true,
            high_confidence_distance: 0.15,
            rerank_threshold_slack: 0.0,
            rerank_threshold_cap: 0.60,
            timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Render as TOML with the per-metric threshold filled in.
    pub fn to_toml_string(&self) -> Result<String> {
        let mut resolved = self.clone();
        resolved.distance_threshold = Some(self.distance_threshold());
        toml::to_string_pretty(&resolved).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check every option. Invalid values are reported, never corrected.
    pub fn validate(&self) -> Result<()> {
        if self.return_n == 0 {
            return Err(Error::Config("return_n must be at least 1".to_string()));
        }
        if self.retrieve_k < self.return_n {
            return Err(Error::Config(format!(
                "retrieve_k ({}) must be >= return_n ({})",
                self.retrieve_k, self.return_n
            )));
        }
        if self.enable_expansion && self.expansion_variant_count == 0 {
            return Err(Error::Config(
                "expansion_variant_count must be at least 1 when expansion is enabled".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::Config("timeout_ms must be greater than 0".to_string()));
        }

        let distances = [
            ("distance_threshold", self.distance_threshold()),
            ("high_confidence_distance", self.high_confidence_distance),
            ("rerank_threshold_slack", self.rerank_threshold_slack),
            ("rerank_threshold_cap", self.rerank_threshold_cap),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Effective distance threshold.
    #[must_use]
    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
            .unwrap_or_else(|| self.metric.default_threshold())
    }

    /// Threshold applied at retrieval time.
    ///
    /// Relaxed by `rerank_threshold_slack` (capped) when reranking is on, so
    /// borderline candidates still reach the scorer. Never stricter than
    /// [`distance_threshold`](Self::distance_threshold).
    #[must_use]
    pub fn retrieval_threshold(&self) -> f32 {
        let strict = self.distance_threshold();
        if !self.enable_reranking || self.rerank_threshold_slack <= 0.0 {
            return strict;
        }
        (strict + self.rerank_threshold_slack)
            .min(self.rerank_threshold_cap)
            .max(strict)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
