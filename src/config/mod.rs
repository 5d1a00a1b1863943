// Configuration management
// TOML-backed settings for the store, embedding providers, and search policy.
// Environment access goes through an explicitly captured EnvSnapshot rather
// than ad-hoc process reads.


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::provider::DEFAULT_OLLAMA_MODEL;

pub const DEFAULT_BATCH_SIZE: u32 = 16;
pub const DEFAULT_HYBRID_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Default provider identifier; explicit arguments and the environment
    /// still take their usual precedence.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Weight of the embedding score in hybrid fusion; the keyword score gets
    /// the complement.
    pub hybrid_weight: f32,
    /// `provider/model` pairs for which embedding search is downgraded to
    /// keyword-only.
    pub keyword_only_models: Vec<String>,
    pub default_limit: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            hybrid_weight: DEFAULT_HYBRID_WEIGHT,
            keyword_only_models: vec![
                "huggingface/sentence-transformers/all-MiniLM-L6-v2".to_string(),
            ],
            default_limit: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid hybrid weight: {0} (must be between 0.0 and 1.0)")]
    InvalidHybridWeight(f32),
    #[error("Invalid result limit: {0} (must be between 1 and 1000)")]
    InvalidLimit(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `<config_dir>/config.toml`, falling back to
    /// defaults when the file is absent.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedding: EmbeddingConfig {
                    batch_size: DEFAULT_BATCH_SIZE,
                    ..EmbeddingConfig::default()
                },
                ollama: OllamaConfig::default(),
                search: SearchConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();
        if config.embedding.batch_size == 0 {
            config.embedding.batch_size = DEFAULT_BATCH_SIZE;
        }

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        if self.embedding.batch_size == 0 || self.embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding.batch_size));
        }

        if !(0.0..=1.0).contains(&self.search.hybrid_weight) {
            return Err(ConfigError::InvalidHybridWeight(self.search.hybrid_weight));
        }

        if self.search.default_limit == 0 || self.search.default_limit > 1000 {
            return Err(ConfigError::InvalidLimit(self.search.default_limit));
        }

        Ok(())
    }

    /// Path of the relational store file.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("store.db")
    }

    /// Directory holding per-collection vector index snapshots.
    #[inline]
    pub fn vectors_dir(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        Ok(())
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

/// Default configuration directory (`~/.config/medsearch` or the platform
/// equivalent).
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::DirectoryError)?
        .join("medsearch");
    fs::create_dir_all(&dir).map_err(|_| ConfigError::DirectoryError)?;
    Ok(dir)
}
