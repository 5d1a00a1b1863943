
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named namespace of documents sharing one embedding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<i64>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub collection_id: i64,
    pub doc_key: String,
    pub body: String,
    /// JSON object serialized as text.
    pub metadata: String,
    pub content_hash: String,
    pub embedded_hash: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: Option<NaiveDateTime>,
}

/// Caller-supplied document payload for upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub key: String,
    pub body: String,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
    /// Digest of the body; computed with [`content_hash`] when the caller does
    /// not supply one.
    #[serde(default)]
    pub content_hash: Option<String>,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Outcome counts of a batch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub inserted: usize,
    /// Body changed; the row now requires re-embedding.
    pub updated: usize,
    /// Same content hash; at most metadata was refreshed.
    pub unchanged: usize,
}

impl Document {
    /// Parse the metadata column back into structured form.
    #[inline]
    pub fn metadata_json(&self) -> crate::Result<serde_json::Value> {
        serde_json::from_str(&self.metadata)
            .map_err(|e| crate::SearchError::Storage(format!("Malformed document metadata: {e}")))
    }

    /// Whether the stored embedding (if any) still matches the body.
    #[inline]
    pub fn needs_embedding(&self) -> bool {
        self.embedded_hash.as_deref() != Some(self.content_hash.as_str())
    }
}

impl NewDocument {
    #[inline]
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
            metadata: default_metadata(),
            content_hash: None,
        }
    }

    #[inline]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The effective content hash, computing one from the body if absent.
    #[inline]
    pub fn effective_hash(&self) -> String {
        self.content_hash
            .clone()
            .unwrap_or_else(|| content_hash(&self.body))
    }
}

/// SHA-256 digest of a document body, hex-encoded.
#[inline]
pub fn content_hash(body: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(body.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
