use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index not loaded for collection '{0}'")]
    NotInitialized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for SearchError {
    #[inline]
    fn from(e: sqlx::Error) -> Self {
        SearchError::Storage(e.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod provider;
pub mod search;
pub mod sync;
