
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, build_agent, request_with_retry};
use crate::config::OllamaConfig;
use crate::provider::Provider;
use crate::{Result, SearchError};

/// Client for a local Ollama server. The final fallback provider: it needs no
/// credential, only a reachable server.
pub struct OllamaClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig, model: &str) -> Result<Self> {
        let base_url = config
            .url()
            .map_err(|e| SearchError::Config(format!("Invalid Ollama URL: {e}")))?;

        Ok(Self {
            base_url,
            model: model.to_string(),
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }
}

impl super::EmbeddingClient for OllamaClient {
    #[inline]
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| SearchError::Config(format!("Failed to build embedding URL: {e}")))?;

        debug!("Requesting {} embeddings from {}", texts.len(), url);

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| SearchError::Provider(format!("Failed to serialize request: {e}")))?;

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Provider(format!("Failed to parse response: {e}")))?;

        if response.embeddings.len() != texts.len() {
            return Err(SearchError::Provider(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }

    /// A local server needs to be running; check before committing to a
    /// backfill.
    #[inline]
    fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| SearchError::Config(format!("Failed to build ping URL: {e}")))?;

        debug!("Pinging Ollama server at {}", url);

        request_with_retry(self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        Ok(())
    }
}
