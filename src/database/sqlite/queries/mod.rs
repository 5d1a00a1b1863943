#[cfg(test)]
mod tests;

use super::models::{Collection, Document, InsertOutcome, NewDocument};
use crate::{Result, SearchError};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct CollectionQueries;

impl CollectionQueries {
    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Collection>> {
        let result = sqlx::query_as::<_, Collection>(
            r#"
            SELECT id, name, description, embedding_model, embedding_dimensions, created_date
            FROM collections WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(result)
    }

    /// Create the collection if absent, otherwise update the supplied fields.
    /// Embedding dimensionality is immutable once set.
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        name: &str,
        description: Option<&str>,
        embedding_model: Option<&str>,
        embedding_dimensions: Option<i64>,
    ) -> Result<Collection> {
        if let Some(existing) = Self::get_by_name(pool, name).await? {
            if let (Some(current), Some(requested)) =
                (existing.embedding_dimensions, embedding_dimensions)
            {
                if current != requested {
                    return Err(SearchError::Validation(format!(
                        "Collection '{name}' already has embedding dimensionality {current}, cannot change to {requested}"
                    )));
                }
            }

            sqlx::query(
                r#"
                UPDATE collections SET
                    description = COALESCE(?, description),
                    embedding_model = COALESCE(?, embedding_model),
                    embedding_dimensions = COALESCE(?, embedding_dimensions)
                WHERE id = ?
                "#,
            )
            .bind(description)
            .bind(embedding_model)
            .bind(embedding_dimensions)
            .bind(existing.id)
            .execute(pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO collections (name, description, embedding_model, embedding_dimensions, created_date)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(description)
            .bind(embedding_model)
            .bind(embedding_dimensions)
            .bind(Utc::now().naive_utc())
            .execute(pool)
            .await?;
        }

        Self::get_by_name(pool, name)
            .await?
            .ok_or_else(|| SearchError::Storage(format!("Failed to retrieve collection '{name}'")))
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Collection>> {
        let collections = sqlx::query_as::<_, Collection>(
            r#"
            SELECT id, name, description, embedding_model, embedding_dimensions, created_date
            FROM collections ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(collections)
    }
}

pub struct DocumentQueries;

const DOCUMENT_COLUMNS: &str = "id, collection_id, doc_key, body, metadata, \
     content_hash, embedded_hash, created_date, updated_date";

impl DocumentQueries {
    /// Upsert a batch of documents keyed by (collection, key).
    ///
    /// A matching content hash leaves the body and embedding state untouched
    /// (metadata may still be refreshed); a differing hash replaces body and
    /// metadata and clears `embedded_hash` so the row is picked up for
    /// re-embedding.
    #[inline]
    pub async fn upsert_batch(
        pool: &SqlitePool,
        collection_id: i64,
        docs: &[NewDocument],
    ) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        let now = Utc::now().naive_utc();

        for doc in docs {
            let hash = doc.effective_hash();
            let metadata = serde_json::to_string(&doc.metadata)
                .map_err(|e| SearchError::Validation(format!("Unserializable metadata: {e}")))?;

            let existing = sqlx::query_as::<_, Document>(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection_id = ? AND doc_key = ?"
            ))
            .bind(collection_id)
            .bind(&doc.key)
            .fetch_optional(pool)
            .await?;

            match existing {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents
                            (collection_id, doc_key, body, metadata, content_hash, created_date)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(collection_id)
                    .bind(&doc.key)
                    .bind(&doc.body)
                    .bind(&metadata)
                    .bind(&hash)
                    .bind(now)
                    .execute(pool)
                    .await?;
                    outcome.inserted += 1;
                }
                Some(row) if row.content_hash == hash => {
                    if row.metadata != metadata {
                        sqlx::query(
                            "UPDATE documents SET metadata = ?, updated_date = ? WHERE id = ?",
                        )
                        .bind(&metadata)
                        .bind(now)
                        .bind(row.id)
                        .execute(pool)
                        .await?;
                    }
                    outcome.unchanged += 1;
                }
                Some(row) => {
                    sqlx::query(
                        r#"
                        UPDATE documents SET
                            body = ?, metadata = ?, content_hash = ?,
                            embedded_hash = NULL, updated_date = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&doc.body)
                    .bind(&metadata)
                    .bind(&hash)
                    .bind(now)
                    .bind(row.id)
                    .execute(pool)
                    .await?;
                    outcome.updated += 1;
                }
            }
        }

        debug!(
            "Upserted batch into collection {}: {} inserted, {} updated, {} unchanged",
            collection_id, outcome.inserted, outcome.updated, outcome.unchanged
        );
        Ok(outcome)
    }

    #[inline]
    pub async fn list_for_collection(
        pool: &SqlitePool,
        collection_id: i64,
    ) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection_id = ? ORDER BY id"
        ))
        .bind(collection_id)
        .fetch_all(pool)
        .await?;

        Ok(docs)
    }

    #[inline]
    pub async fn get_by_keys(
        pool: &SqlitePool,
        collection_id: i64,
        keys: &[String],
    ) -> Result<Vec<Document>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE collection_id = ? AND doc_key IN ({placeholders}) ORDER BY id"
        );

        let mut query = sqlx::query_as::<_, Document>(&sql).bind(collection_id);
        for key in keys {
            query = query.bind(key);
        }

        Ok(query.fetch_all(pool).await?)
    }

    #[inline]
    pub async fn get_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id IN ({placeholders})");

        let mut query = sqlx::query_as::<_, Document>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query.fetch_all(pool).await?)
    }

    /// Case-insensitive token search over document bodies, ranked by total
    /// match count.
    #[inline]
    pub async fn search_keyword(
        pool: &SqlitePool,
        collection_id: i64,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<(Document, f32)>> {
        let tokens: Vec<String> = query_text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let like_clauses = vec!["lower(body) LIKE ? ESCAPE '\\'"; tokens.len()].join(" OR ");
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE collection_id = ? AND ({like_clauses}) ORDER BY id"
        );

        let mut query = sqlx::query_as::<_, Document>(&sql).bind(collection_id);
        for token in &tokens {
            query = query.bind(format!("%{}%", escape_like(token)));
        }

        let candidates = query.fetch_all(pool).await?;

        let mut scored: Vec<(Document, f32)> = candidates
            .into_iter()
            .map(|doc| {
                let body = doc.body.to_lowercase();
                let count: usize = tokens.iter().map(|t| body.matches(t.as_str()).count()).sum();
                (doc, count as f32)
            })
            .filter(|&(_, score)| score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored)
    }

    /// Documents whose embedding is missing or stale relative to the body.
    #[inline]
    pub async fn needing_embedding(
        pool: &SqlitePool,
        collection_id: i64,
    ) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE collection_id = ? \
               AND (embedded_hash IS NULL OR embedded_hash != content_hash) \
             ORDER BY id"
        ))
        .bind(collection_id)
        .fetch_all(pool)
        .await?;

        Ok(docs)
    }

    /// Record that the listed documents' current bodies have been embedded.
    #[inline]
    pub async fn mark_embedded(pool: &SqlitePool, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE documents SET embedded_hash = content_hash WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(pool).await?;

        Ok(())
    }

    #[inline]
    pub async fn count(pool: &SqlitePool, collection_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }
}

fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
