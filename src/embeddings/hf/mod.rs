
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, build_agent, request_with_retry};
use crate::provider::Provider;
use crate::{Result, SearchError};

const HF_INFERENCE_BASE: &str = "https://api-inference.huggingface.co";

/// Client for the Hugging Face serverless inference feature-extraction
/// pipeline.
pub struct HfClient {
    base_url: Url,
    token: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    inputs: &'a [String],
    options: ExtractOptions,
}

#[derive(Debug, Serialize)]
struct ExtractOptions {
    wait_for_model: bool,
}

impl HfClient {
    #[inline]
    pub fn new(token: impl Into<String>, model: &str) -> Result<Self> {
        let base_url = Url::parse(HF_INFERENCE_BASE)
            .map_err(|e| SearchError::Config(format!("Invalid Hugging Face endpoint: {e}")))?;

        Ok(Self {
            base_url,
            token: token.into(),
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
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    fn extraction_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("pipeline/feature-extraction/{}", self.model))
            .map_err(|e| SearchError::Config(format!("Invalid model path: {e}")))
    }
}

impl super::EmbeddingClient for HfClient {
    #[inline]
    fn provider(&self) -> Provider {
        Provider::HuggingFace
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

        let url = self.extraction_url()?;
        debug!("Requesting {} embeddings from {}", texts.len(), url);

        let request = ExtractRequest {
            inputs: texts,
            options: ExtractOptions {
                wait_for_model: true,
            },
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| SearchError::Provider(format!("Failed to serialize request: {e}")))?;

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", &format!("Bearer {}", self.token))
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embeddings: Vec<Vec<f32>> = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Provider(format!("Failed to parse response: {e}")))?;

        if embeddings.len() != texts.len() {
            return Err(SearchError::Provider(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
