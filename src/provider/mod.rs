// Embedding provider resolution
// Resolves a provider/model pair from explicit arguments, a captured environment
// snapshot, and available credentials. Never fails: the local provider is the
// final fallback.


use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Environment variable naming the default provider.
pub const ENV_PROVIDER: &str = "MEDSEARCH_EMBED_PROVIDER";
/// Environment variable naming the default model.
pub const ENV_MODEL: &str = "MEDSEARCH_EMBED_MODEL";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_AZURE_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const ENV_AZURE_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_AZURE_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
pub const ENV_HF_TOKEN: &str = "HF_TOKEN";

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "text-embedding-3-small";
pub const DEFAULT_HF_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text:latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Azure,
    HuggingFace,
    /// Local Ollama server; requires no credential.
    Ollama,
}

/// Credential-sniffing preference order used when neither an explicit argument
/// nor an environment default names a provider.
pub const PROVIDER_PREFERENCE: [Provider; 4] = [
    Provider::OpenAi,
    Provider::Azure,
    Provider::HuggingFace,
    Provider::Ollama,
];

impl Provider {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Provider::OpenAi => "openai",
            Provider::Azure => "azure",
            Provider::HuggingFace => "huggingface",
            Provider::Ollama => "ollama",
        }
    }

    #[inline]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "azure" | "azure_openai" | "azure-openai" => Some(Provider::Azure),
            "huggingface" | "hf" => Some(Provider::HuggingFace),
            "ollama" | "local" => Some(Provider::Ollama),
            _ => None,
        }
    }

    /// The environment variable holding this provider's credential, if it
    /// requires one.
    #[inline]
    pub fn credential_var(&self) -> Option<&'static str> {
        match *self {
            Provider::OpenAi => Some(ENV_OPENAI_API_KEY),
            Provider::Azure => Some(ENV_AZURE_API_KEY),
            Provider::HuggingFace => Some(ENV_HF_TOKEN),
            Provider::Ollama => None,
        }
    }

    #[inline]
    pub fn has_credential(&self, env: &EnvSnapshot) -> bool {
        match self.credential_var() {
            Some(var) => env.get(var).is_some_and(|v| !v.trim().is_empty()),
            None => true,
        }
    }
}

impl fmt::Display for Provider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable capture of the process environment, taken once at startup and
/// passed by reference so that resolution is deterministic and testable without
/// mutating process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[inline]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// An empty snapshot, useful as a neutral baseline in tests.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    #[inline]
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Resolve the embedding provider.
///
/// Precedence: explicit argument > environment default > configuration-file
/// default > first provider in preference order with an available credential >
/// local fallback.
#[inline]
pub fn resolve_provider(
    explicit: Option<&str>,
    config_default: Option<&str>,
    env: &EnvSnapshot,
) -> Provider {
    if let Some(name) = explicit {
        match Provider::parse(name) {
            Some(provider) => return provider,
            None => warn!("Unrecognized provider '{}', ignoring", name),
        }
    }

    if let Some(name) = env.get(ENV_PROVIDER) {
        match Provider::parse(name) {
            Some(provider) => return provider,
            None => warn!("Unrecognized provider '{}' in {}, ignoring", name, ENV_PROVIDER),
        }
    }

    if let Some(name) = config_default {
        match Provider::parse(name) {
            Some(provider) => return provider,
            None => warn!("Unrecognized provider '{}' in configuration, ignoring", name),
        }
    }

    for provider in PROVIDER_PREFERENCE {
        if provider.has_credential(env) {
            debug!("Resolved provider {} from available credentials", provider);
            return provider;
        }
    }

    Provider::Ollama
}

/// Resolve the embedding model for a provider.
///
/// Precedence: explicit argument > environment default > configuration-file
/// default > per-provider default, with the Azure deployment name overridable
/// separately.
#[inline]
pub fn resolve_model(
    provider: Provider,
    explicit: Option<&str>,
    config_default: Option<&str>,
    env: &EnvSnapshot,
) -> String {
    if let Some(model) = explicit.map(str::trim).filter(|m| !m.is_empty()) {
        return model.to_string();
    }

    if let Some(model) = env.get(ENV_MODEL) {
        return model.to_string();
    }

    if let Some(model) = config_default.map(str::trim).filter(|m| !m.is_empty()) {
        return model.to_string();
    }

    match provider {
        Provider::OpenAi => DEFAULT_OPENAI_MODEL.to_string(),
        Provider::Azure => env
            .get(ENV_AZURE_DEPLOYMENT)
            .unwrap_or(DEFAULT_AZURE_DEPLOYMENT)
            .to_string(),
        Provider::HuggingFace => DEFAULT_HF_MODEL.to_string(),
        Provider::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
    }
}
