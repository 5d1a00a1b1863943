// Dual-store consistency
// The relational store and the vector index are persisted independently with
// no shared transaction boundary; a crash between writes leaves them out of
// step. This module detects the drift and repairs it with an idempotent
// reconciliation pass.


use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::sqlite::DocumentStore;
use crate::database::vector::{VectorStore, normalize};
use crate::embeddings::Embedder;

/// Drift between the document store and the vector index for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub collection: String,
    pub store_documents: usize,
    pub index_entries: usize,
    /// Document ids present in the store but absent from the index.
    pub missing_in_index: Vec<i64>,
    /// Document ids whose body changed after their embedding was computed.
    pub stale_embeddings: Vec<i64>,
    /// Index ids with no corresponding store row.
    pub orphaned_in_index: Vec<i64>,
}

impl ConsistencyReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.missing_in_index.is_empty()
            && self.stale_embeddings.is_empty()
            && self.orphaned_in_index.is_empty()
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len() + self.stale_embeddings.len() + self.orphaned_in_index.len()
    }

    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent() {
            format!(
                "Collection '{}' is consistent: {} documents, {} index entries",
                self.collection, self.store_documents, self.index_entries
            )
        } else {
            format!(
                "Collection '{}' has drift: {} missing from index, {} stale, {} orphaned",
                self.collection,
                self.missing_in_index.len(),
                self.stale_embeddings.len(),
                self.orphaned_in_index.len()
            )
        }
    }
}

/// Compare document ids and embedding hashes against the index contents.
/// Read-only; the index must already be loaded for the collection.
#[inline]
pub async fn check_consistency(
    store: &DocumentStore,
    vectors: &VectorStore,
    collection: &str,
) -> Result<ConsistencyReport> {
    let docs = store.fetch_docs(collection, None).await?;
    let index_ids = vectors.ids(collection)?;
    let index_set: HashSet<i64> = index_ids.iter().copied().collect();
    let store_set: HashSet<i64> = docs.iter().map(|d| d.id).collect();

    let missing_in_index: Vec<i64> = docs
        .iter()
        .filter(|d| !index_set.contains(&d.id))
        .map(|d| d.id)
        .collect();
    let stale_embeddings: Vec<i64> = docs
        .iter()
        .filter(|d| index_set.contains(&d.id) && d.needs_embedding())
        .map(|d| d.id)
        .collect();
    let orphaned_in_index: Vec<i64> = index_ids
        .into_iter()
        .filter(|id| !store_set.contains(id))
        .collect();

    let report = ConsistencyReport {
        collection: collection.to_string(),
        store_documents: docs.len(),
        index_entries: index_set.len(),
        missing_in_index,
        stale_embeddings,
        orphaned_in_index,
    };

    if report.is_consistent() {
        debug!("{}", report.summary());
    } else {
        warn!("{}", report.summary());
    }

    Ok(report)
}

/// Repair drift for one collection: drop orphaned index entries, re-embed
/// missing and stale documents, and record their embedded hashes. Safe to
/// re-run; a consistent pair is a no-op.
#[inline]
pub async fn reconcile(
    store: &DocumentStore,
    vectors: &mut VectorStore,
    embedder: &Embedder,
    collection: &str,
) -> Result<ConsistencyReport> {
    let report = check_consistency(store, vectors, collection).await?;
    if report.is_consistent() {
        return Ok(report);
    }

    if !report.orphaned_in_index.is_empty() {
        vectors.remove(collection, &report.orphaned_in_index)?;
    }

    let mut pending_ids: Vec<i64> = report
        .missing_in_index
        .iter()
        .chain(report.stale_embeddings.iter())
        .copied()
        .collect();
    pending_ids.sort_unstable();
    pending_ids.dedup();

    if !pending_ids.is_empty() {
        let docs = store.fetch_docs_by_ids(&pending_ids).await?;
        let texts: Vec<String> = docs.iter().map(|d| d.body.clone()).collect();
        let mut embeddings = embedder.embed(&texts)?;
        for vector in &mut embeddings {
            normalize(vector);
        }

        let ids: Vec<i64> = docs.iter().map(|d| d.id).collect();
        vectors.add_embeddings(collection, &ids, &embeddings)?;
        store.mark_embedded(&ids).await?;
    }

    info!(
        "Reconciled collection '{}': {} re-embedded, {} orphans removed",
        collection,
        pending_ids.len(),
        report.orphaned_in_index.len()
    );

    check_consistency(store, vectors, collection).await
}
