// Embedding generation
// A capability trait with one client per provider, and an Embedder façade
// that resolves the provider/model pair, enforces batching, and checks that
// every provider returns vectors of a single fixed dimensionality.

#[cfg(test)]
mod tests;

pub mod hf;
pub mod ollama;
pub mod openai;

pub use hf::HfClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::provider::{
    ENV_AZURE_API_KEY, ENV_AZURE_ENDPOINT, ENV_HF_TOKEN, ENV_OPENAI_API_KEY, EnvSnapshot,
    Provider, resolve_model, resolve_provider,
};
use crate::{Result, SearchError};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// A provider-specific embedding backend. Implementations own their request
/// batching limits and response parsing; they do not cache.
pub trait EmbeddingClient: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    /// Embed one batch of texts, returning one vector per input in order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Cheap reachability check, run before a backfill. Hosted providers
    /// report ready without a round trip; their first embed call surfaces any
    /// auth or connectivity problem.
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Dispatches embedding requests to the resolved provider client, splitting
/// inputs into provider-friendly batches.
pub struct Embedder {
    client: Box<dyn EmbeddingClient>,
    batch_size: usize,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Embedder {
    /// Construct an embedder from configuration and an environment snapshot.
    ///
    /// Fails with a configuration error when the resolved provider requires a
    /// credential that is not present in the snapshot.
    #[inline]
    pub fn from_config(
        config: &Config,
        env: &EnvSnapshot,
        explicit_provider: Option<&str>,
        explicit_model: Option<&str>,
    ) -> Result<Self> {
        let provider = resolve_provider(
            explicit_provider,
            config.embedding.provider.as_deref(),
            env,
        );
        let model = resolve_model(
            provider,
            explicit_model,
            config.embedding.model.as_deref(),
            env,
        );

        debug!("Constructing embedder for {}/{}", provider, model);

        let client: Box<dyn EmbeddingClient> = match provider {
            Provider::OpenAi => {
                let api_key = require_credential(env, ENV_OPENAI_API_KEY, provider)?;
                Box::new(OpenAiClient::new_openai(api_key, &model)?)
            }
            Provider::Azure => {
                let api_key = require_credential(env, ENV_AZURE_API_KEY, provider)?;
                let endpoint = env.get(ENV_AZURE_ENDPOINT).ok_or_else(|| {
                    SearchError::Config(format!(
                        "Provider azure requires {ENV_AZURE_ENDPOINT} to be set"
                    ))
                })?;
                Box::new(OpenAiClient::new_azure(endpoint, api_key, &model)?)
            }
            Provider::HuggingFace => {
                let token = require_credential(env, ENV_HF_TOKEN, provider)?;
                Box::new(HfClient::new(token, &model)?)
            }
            Provider::Ollama => Box::new(OllamaClient::new(&config.ollama, &model)?),
        };

        Ok(Self {
            client,
            batch_size: config.embedding.batch_size as usize,
        })
    }

    /// Wrap an existing client, bypassing resolution. Useful for callers with
    /// their own backend.
    #[inline]
    pub fn from_client(client: Box<dyn EmbeddingClient>, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    #[inline]
    pub fn provider(&self) -> Provider {
        self.client.provider()
    }

    #[inline]
    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// The `provider/model` pair, as matched against the keyword-only
    /// downgrade list.
    #[inline]
    pub fn provider_model_key(&self) -> String {
        format!("{}/{}", self.provider(), self.model())
    }

    /// Embed a list of texts, batching requests. All returned vectors share
    /// one dimensionality; a provider violating that is an error.
    #[inline]
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let batch = self.client.embed_batch(chunk)?;
            if batch.len() != chunk.len() {
                return Err(SearchError::Provider(format!(
                    "Provider {} returned {} embeddings for {} inputs",
                    self.provider(),
                    batch.len(),
                    chunk.len()
                )));
            }
            results.extend(batch);
        }

        if let Some(dim) = results.first().map(Vec::len) {
            if let Some(bad) = results.iter().find(|v| v.len() != dim) {
                return Err(SearchError::Provider(format!(
                    "Provider {} returned mixed dimensionalities ({} and {})",
                    self.provider(),
                    dim,
                    bad.len()
                )));
            }
        }

        debug!("Generated {} embeddings via {}", results.len(), self.provider());
        Ok(results)
    }

    /// Check that the backing provider is reachable.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.client.ping()
    }

    /// Embed a single query string.
    #[inline]
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::Provider("Provider returned no embedding".to_string()))
    }
}

fn require_credential(env: &EnvSnapshot, var: &str, provider: Provider) -> Result<String> {
    env.get(var).map(str::to_string).ok_or_else(|| {
        SearchError::Config(format!("Provider {provider} requires {var} to be set"))
    })
}

/// Shared HTTP agent construction with a global timeout.
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Run an HTTP request with bounded retries. Server errors and transport
/// failures retry with exponential backoff; client errors fail immediately.
pub(crate) fn request_with_retry<F>(retry_attempts: u32, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> std::result::Result<String, ureq::Error>,
{
    let mut last_error = None;

    for attempt in 1..=retry_attempts {
        debug!("HTTP request attempt {}/{}", attempt, retry_attempts);

        match request_fn() {
            Ok(response_text) => return Ok(response_text),
            Err(error) => {
                let should_retry = match &error {
                    ureq::Error::StatusCode(status) => {
                        if *status >= 500 {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, retry_attempts
                            );
                            true
                        } else {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(SearchError::Provider(format!(
                                "Client error: HTTP {status}"
                            )));
                        }
                    }
                    ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_) => {
                        warn!(
                            "Transport error: {}, attempt {}/{}",
                            error, attempt, retry_attempts
                        );
                        true
                    }
                    _ => {
                        warn!("Non-retryable error: {}", error);
                        false
                    }
                };

                if !should_retry {
                    return Err(SearchError::Provider(format!(
                        "Non-retryable error: {error}"
                    )));
                }

                last_error = Some(SearchError::Provider(format!("Request error: {error}")));

                if attempt < retry_attempts {
                    let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                    std::thread::sleep(Duration::from_millis(delay_ms));
                }
            }
        }
    }

    error!("All {} retry attempts failed", retry_attempts);
    Err(last_error
        .unwrap_or_else(|| SearchError::Provider("Request failed after retries".to_string())))
}
