// Hybrid search façade
// Dispatches a query to keyword search (document store), embedding search
// (vector index), or both, with a policy-driven downgrade to keyword-only for
// provider/model pairs known to be unreliable. Downgrades are surfaced to the
// caller, never silent.


use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::database::sqlite::{Document, DocumentStore};
use crate::database::vector::{VectorStore, normalize};
use crate::embeddings::Embedder;
use crate::{Result, SearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Keyword,
    Embedding,
    Hybrid,
}

impl fmt::Display for SearchMethod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SearchMethod::Keyword => write!(f, "keyword"),
            SearchMethod::Embedding => write!(f, "embedding"),
            SearchMethod::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for SearchMethod {
    type Err = SearchError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(SearchMethod::Keyword),
            "embedding" | "semantic" => Ok(SearchMethod::Embedding),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => Err(SearchError::Validation(format!(
                "Unknown search method '{other}' (expected keyword, embedding, or hybrid)"
            ))),
        }
    }
}

/// One ranked result. Per-method scores are kept alongside the combined score
/// so callers can see which signal surfaced the hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: i64,
    pub key: String,
    pub body: String,
    pub metadata: String,
    pub score: f32,
    pub keyword_score: Option<f32>,
    pub embedding_score: Option<f32>,
}

/// Result of a search, carrying the method actually used and any downgrade
/// warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub method: SearchMethod,
    pub downgrade: Option<String>,
}

/// Search façade over the document store, vector index, and embedder.
pub struct HybridSearcher<'a> {
    store: &'a DocumentStore,
    vectors: &'a VectorStore,
    embedder: Option<&'a Embedder>,
    policy: &'a SearchConfig,
}

impl<'a> HybridSearcher<'a> {
    #[inline]
    pub fn new(
        store: &'a DocumentStore,
        vectors: &'a VectorStore,
        embedder: Option<&'a Embedder>,
        policy: &'a SearchConfig,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            policy,
        }
    }

    /// Decide the method to actually run, downgrading embedding/hybrid
    /// requests to keyword-only when no usable embedder exists or the
    /// provider/model pair is denylisted.
    #[inline]
    pub fn effective_method(&self, requested: SearchMethod) -> (SearchMethod, Option<String>) {
        if requested == SearchMethod::Keyword {
            return (SearchMethod::Keyword, None);
        }

        let Some(embedder) = self.embedder else {
            let reason = format!(
                "No embedding provider available; '{requested}' downgraded to keyword search"
            );
            warn!("{}", reason);
            return (SearchMethod::Keyword, Some(reason));
        };

        let key = embedder.provider_model_key();
        if self.policy.keyword_only_models.iter().any(|m| m == &key) {
            let reason = format!(
                "Embedding model '{key}' is marked keyword-only; '{requested}' downgraded to keyword search"
            );
            warn!("{}", reason);
            return (SearchMethod::Keyword, Some(reason));
        }

        (requested, None)
    }

    #[inline]
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        requested: SearchMethod,
        limit: usize,
    ) -> Result<SearchOutcome> {
        let (method, downgrade) = self.effective_method(requested);
        debug!(
            "Searching '{}' with method {} (requested {})",
            collection, method, requested
        );

        let hits = match method {
            SearchMethod::Keyword => self.keyword_hits(collection, query, limit).await?,
            SearchMethod::Embedding => self.embedding_hits(collection, query, limit).await?,
            SearchMethod::Hybrid => {
                let keyword = self.keyword_hits(collection, query, limit).await?;
                let embedding = self.embedding_hits(collection, query, limit).await?;
                merge_hits(keyword, embedding, self.policy.hybrid_weight, limit)
            }
        };

        Ok(SearchOutcome {
            hits,
            method,
            downgrade,
        })
    }

    async fn keyword_hits(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let results = self.store.search_keyword(collection, query, limit).await?;
        let max_score = results
            .iter()
            .map(|&(_, score)| score)
            .fold(0.0_f32, f32::max);

        Ok(results
            .into_iter()
            .map(|(doc, score)| {
                let normalized = if max_score > 0.0 { score / max_score } else { 0.0 };
                hit_from_document(doc, normalized, Some(normalized), None)
            })
            .collect())
    }

    async fn embedding_hits(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedder = self
            .embedder
            .ok_or_else(|| SearchError::Config("No embedding provider available".to_string()))?;

        let mut query_vector = embedder.embed_one(query)?;
        normalize(&mut query_vector);

        let scored = self.vectors.search(collection, &query_vector, limit)?;
        let ids: Vec<i64> = scored.iter().map(|&(id, _)| id).collect();
        let docs = self.store.fetch_docs_by_ids(&ids).await?;
        let by_id: HashMap<i64, Document> = docs.into_iter().map(|d| (d.id, d)).collect();

        // Index entries with no store row are drift; skip them rather than
        // failing the query.
        let mut hits = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            match by_id.get(&id) {
                Some(doc) => {
                    let clamped = score.max(0.0);
                    hits.push(hit_from_document(
                        doc.clone(),
                        clamped,
                        None,
                        Some(clamped),
                    ));
                }
                None => warn!("Vector index entry {} has no document row, skipping", id),
            }
        }
        Ok(hits)
    }
}

fn hit_from_document(
    doc: Document,
    score: f32,
    keyword_score: Option<f32>,
    embedding_score: Option<f32>,
) -> SearchHit {
    SearchHit {
        doc_id: doc.id,
        key: doc.doc_key,
        body: doc.body,
        metadata: doc.metadata,
        score,
        keyword_score,
        embedding_score,
    }
}

/// Linear fusion of keyword and embedding result sets, deduplicated by doc
/// id: `weight * embedding + (1 - weight) * keyword`, with absent components
/// contributing zero.
fn merge_hits(
    keyword: Vec<SearchHit>,
    embedding: Vec<SearchHit>,
    weight: f32,
    limit: usize,
) -> Vec<SearchHit> {
    let mut merged: Vec<SearchHit> = Vec::with_capacity(keyword.len() + embedding.len());
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for mut hit in keyword {
        hit.score = (1.0 - weight) * hit.keyword_score.unwrap_or(0.0);
        positions.insert(hit.doc_id, merged.len());
        merged.push(hit);
    }

    for hit in embedding {
        let contribution = weight * hit.embedding_score.unwrap_or(0.0);
        match positions.get(&hit.doc_id) {
            Some(&position) => {
                let existing = &mut merged[position];
                existing.embedding_score = hit.embedding_score;
                existing.score += contribution;
            }
            None => {
                let mut hit = hit;
                hit.score = contribution;
                positions.insert(hit.doc_id, merged.len());
                merged.push(hit);
            }
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}
