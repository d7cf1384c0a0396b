//! Ollama embedding client (`POST /api/embed`).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use tenderflow_shared::{EmbeddingConfig, Result, TenderflowError};

use crate::EmbeddingOracle;

/// Blocking client for a local Ollama embedding model.
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TenderflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingOracle for OllamaEmbedder {
    #[instrument(skip_all, fields(model = %self.model, inputs = texts.len()))]
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                TenderflowError::Network(format!("cannot reach embedding server at {}", self.base_url))
            } else if e.is_timeout() {
                TenderflowError::Network(format!(
                    "embedding request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                TenderflowError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TenderflowError::Oracle(format!("embedding HTTP {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| TenderflowError::parse(format!("embedding response: {e}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(TenderflowError::Oracle(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        debug!(dims = parsed.embeddings.first().map_or(0, Vec::len), "embedded");
        Ok(parsed.embeddings)
    }
}
