#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, build_agent, request_with_retry};
use crate::provider::Provider;
use crate::{Result, SearchError};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const AZURE_API_VERSION: &str = "2024-02-01";

/// Client for the OpenAI embeddings API and Azure OpenAI deployments, which
/// share a request/response shape but differ in endpoint and auth header.
pub struct OpenAiClient {
    provider: Provider,
    endpoint: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    /// Azure deployments encode the model in the URL instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiClient {
    #[inline]
    pub fn new_openai(api_key: impl Into<String>, model: &str) -> Result<Self> {
        let endpoint = Url::parse(OPENAI_EMBEDDINGS_URL)
            .map_err(|e| SearchError::Config(format!("Invalid OpenAI endpoint: {e}")))?;

        Ok(Self {
            provider: Provider::OpenAi,
            endpoint,
            api_key: api_key.into(),
            model: model.to_string(),
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn new_azure(
        endpoint_base: &str,
        api_key: impl Into<String>,
        deployment: &str,
    ) -> Result<Self> {
        let base = Url::parse(endpoint_base)
            .map_err(|e| SearchError::Config(format!("Invalid Azure endpoint: {e}")))?;
        let endpoint = base
            .join(&format!(
                "openai/deployments/{deployment}/embeddings?api-version={AZURE_API_VERSION}"
            ))
            .map_err(|e| SearchError::Config(format!("Invalid Azure deployment URL: {e}")))?;

        Ok(Self {
            provider: Provider::Azure,
            endpoint,
            api_key: api_key.into(),
            model: deployment.to_string(),
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Point the client at a different endpoint, keeping auth and model.
    #[inline]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }
}

impl super::EmbeddingClient for OpenAiClient {
    #[inline]
    fn provider(&self) -> Provider {
        self.provider
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

        debug!(
            "Requesting {} embeddings from {}",
            texts.len(),
            self.provider
        );

        let request = EmbedRequest {
            input: texts,
            model: match self.provider {
                Provider::Azure => None,
                _ => Some(self.model.as_str()),
            },
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| SearchError::Provider(format!("Failed to serialize request: {e}")))?;

        let response_text = request_with_retry(self.retry_attempts, || {
            let mut req = self
                .agent
                .post(self.endpoint.as_str())
                .header("Content-Type", "application/json");
            req = match self.provider {
                Provider::Azure => req.header("api-key", &self.api_key),
                _ => req.header("Authorization", &format!("Bearer {}", self.api_key)),
            };
            req.send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Provider(format!("Failed to parse response: {e}")))?;

        if response.data.len() != texts.len() {
            return Err(SearchError::Provider(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
