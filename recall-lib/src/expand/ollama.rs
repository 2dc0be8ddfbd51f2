use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Collaborator;
use crate::expand::TextGenerator;
use crate::{Error, Result};

/// Connection settings for an Ollama server.
///
/// Defaults come from `RECALL_OLLAMA_URL` (default `http://localhost:11434`)
/// and `RECALL_OLLAMA_MODEL` (default `llama3.2`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("RECALL_OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("RECALL_OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            timeout_secs: 30,
            temperature: 0.3,
        }
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("ollama endpoint cannot be empty".to_string()));
        }
        if self.model.is_empty() {
            return Err(Error::Config("ollama model cannot be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("ollama timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Text generator backed by Ollama's `/api/generate` endpoint.
pub struct OllamaGenerator {
    client: Client,
    config: OllamaConfig,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::unavailable(Collaborator::TextGenerator, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable(
                Collaborator::TextGenerator,
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {e}")))?;

        Ok(body.response)
    }
}
