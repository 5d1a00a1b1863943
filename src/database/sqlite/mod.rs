use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::{Result, SearchError};


pub mod models;
pub mod queries;

pub use models::{Collection, Document, InsertOutcome, NewDocument, content_hash};
pub use queries::{CollectionQueries, DocumentQueries};

pub type DbPool = Pool<Sqlite>;

/// Relational store of collections and documents, persisted as a single SQLite
/// file. The companion vector index lives in separate per-collection files and
/// is reconciled explicitly, never transactionally.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: DbPool,
}

impl DocumentStore {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| SearchError::Storage(format!("Failed to open document store: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Open (or create) the store file inside a base directory.
    #[inline]
    pub async fn open_in_dir(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(|e| {
            SearchError::Storage(format!(
                "Failed to create store directory {}: {e}",
                base_dir.display()
            ))
        })?;

        let db_path = base_dir.join("store.db");
        Self::new(db_path).await
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running document store migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SearchError::Storage(format!("Failed to run schema migration: {e}")))?;

        debug!("Document store migrations completed");
        Ok(())
    }

    /// Create or update a collection. Supplied fields overwrite stored ones,
    /// except dimensionality which is immutable once set.
    #[inline]
    pub async fn upsert_collection(
        &self,
        name: &str,
        description: Option<&str>,
        embedding_model: Option<&str>,
        embedding_dimensions: Option<i64>,
    ) -> Result<Collection> {
        validate_collection_name(name)?;
        CollectionQueries::upsert(
            &self.pool,
            name,
            description,
            embedding_model,
            embedding_dimensions,
        )
        .await
    }

    #[inline]
    pub async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        CollectionQueries::get_by_name(&self.pool, name).await
    }

    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        CollectionQueries::list_all(&self.pool).await
    }

    /// Idempotent batch upsert keyed by (collection, key). Creates the
    /// collection lazily on first use.
    #[inline]
    pub async fn insert_docs(
        &self,
        collection: &str,
        docs: &[NewDocument],
    ) -> Result<InsertOutcome> {
        validate_collection_name(collection)?;
        let collection = match self.get_collection(collection).await? {
            Some(c) => c,
            None => self.upsert_collection(collection, None, None, None).await?,
        };

        DocumentQueries::upsert_batch(&self.pool, collection.id, docs).await
    }

    /// Fetch all documents in a collection, or only the given keys. A missing
    /// collection yields an empty list rather than an error.
    #[inline]
    pub async fn fetch_docs(
        &self,
        collection: &str,
        keys: Option<&[String]>,
    ) -> Result<Vec<Document>> {
        let Some(collection) = self.get_collection(collection).await? else {
            return Ok(Vec::new());
        };

        match keys {
            Some(keys) => DocumentQueries::get_by_keys(&self.pool, collection.id, keys).await,
            None => DocumentQueries::list_for_collection(&self.pool, collection.id).await,
        }
    }

    #[inline]
    pub async fn fetch_docs_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>> {
        DocumentQueries::get_by_ids(&self.pool, ids).await
    }

    /// Case-insensitive keyword search ranked by match count. A missing
    /// collection yields an empty result set.
    #[inline]
    pub async fn search_keyword(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Document, f32)>> {
        let Some(collection) = self.get_collection(collection).await? else {
            return Ok(Vec::new());
        };

        DocumentQueries::search_keyword(&self.pool, collection.id, query, limit).await
    }

    #[inline]
    pub async fn docs_needing_embedding(&self, collection: &str) -> Result<Vec<Document>> {
        let Some(collection) = self.get_collection(collection).await? else {
            return Ok(Vec::new());
        };

        DocumentQueries::needing_embedding(&self.pool, collection.id).await
    }

    #[inline]
    pub async fn mark_embedded(&self, ids: &[i64]) -> Result<()> {
        DocumentQueries::mark_embedded(&self.pool, ids).await
    }

    #[inline]
    pub async fn count_documents(&self, collection: &str) -> Result<i64> {
        let Some(collection) = self.get_collection(collection).await? else {
            return Ok(0);
        };

        DocumentQueries::count(&self.pool, collection.id).await
    }

    /// Release the underlying pool. Idempotent.
    #[inline]
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }
}

/// Collection names become file names for index snapshots and sync paths, so
/// they are restricted to a conservative character set.
#[inline]
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());

    if valid {
        Ok(())
    } else {
        Err(SearchError::Validation(format!(
            "Invalid collection name '{name}': must be non-empty ASCII alphanumerics, '_', '-' or '.', starting with an alphanumeric"
        )))
    }
}
