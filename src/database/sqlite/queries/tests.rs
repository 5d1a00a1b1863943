use super::*;
use crate::database::sqlite::DocumentStore;
use tempfile::TempDir;

async fn store_with_collection(name: &str) -> (TempDir, DocumentStore, i64) {
    let temp_dir = TempDir::new().expect("tempdir");
    let store = DocumentStore::open_in_dir(temp_dir.path())
        .await
        .expect("open store");
    let collection = store
        .upsert_collection(name, None, None, None)
        .await
        .expect("collection");
    (temp_dir, store, collection.id)
}

#[tokio::test]
async fn upsert_batch_reports_outcome_counts() {
    let (_tmp, store, collection_id) = store_with_collection("corpus").await;

    let docs = vec![
        NewDocument::new("a", "alpha"),
        NewDocument::new("b", "beta"),
    ];
    let outcome = DocumentQueries::upsert_batch(store.pool(), collection_id, &docs)
        .await
        .expect("insert");
    assert_eq!((outcome.inserted, outcome.updated, outcome.unchanged), (2, 0, 0));

    let docs = vec![
        NewDocument::new("a", "alpha"),
        NewDocument::new("b", "beta revised"),
        NewDocument::new("c", "gamma"),
    ];
    let outcome = DocumentQueries::upsert_batch(store.pool(), collection_id, &docs)
        .await
        .expect("mixed upsert");
    assert_eq!((outcome.inserted, outcome.updated, outcome.unchanged), (1, 1, 1));
}

#[tokio::test]
async fn get_by_ids_returns_matching_rows() {
    let (_tmp, store, collection_id) = store_with_collection("corpus").await;

    let docs = vec![
        NewDocument::new("a", "alpha"),
        NewDocument::new("b", "beta"),
    ];
    DocumentQueries::upsert_batch(store.pool(), collection_id, &docs)
        .await
        .expect("insert");

    let all = DocumentQueries::list_for_collection(store.pool(), collection_id)
        .await
        .expect("list");
    let ids: Vec<i64> = all.iter().map(|d| d.id).collect();

    let fetched = DocumentQueries::get_by_ids(store.pool(), &ids).await.expect("by ids");
    assert_eq!(fetched.len(), 2);

    let fetched = DocumentQueries::get_by_ids(store.pool(), &[]).await.expect("empty");
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn mark_embedded_clears_pending_set() {
    let (_tmp, store, collection_id) = store_with_collection("corpus").await;

    DocumentQueries::upsert_batch(
        store.pool(),
        collection_id,
        &[NewDocument::new("a", "alpha")],
    )
    .await
    .expect("insert");

    let pending = DocumentQueries::needing_embedding(store.pool(), collection_id)
        .await
        .expect("pending");
    assert_eq!(pending.len(), 1);

    DocumentQueries::mark_embedded(store.pool(), &[pending[0].id])
        .await
        .expect("mark");

    let pending = DocumentQueries::needing_embedding(store.pool(), collection_id)
        .await
        .expect("pending after mark");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn search_keyword_empty_query_yields_nothing() {
    let (_tmp, store, collection_id) = store_with_collection("corpus").await;

    DocumentQueries::upsert_batch(
        store.pool(),
        collection_id,
        &[NewDocument::new("a", "alpha")],
    )
    .await
    .expect("insert");

    let results = DocumentQueries::search_keyword(store.pool(), collection_id, "   ", 10)
        .await
        .expect("search");
    assert!(results.is_empty());
}

#[tokio::test]
async fn search_keyword_respects_limit() {
    let (_tmp, store, collection_id) = store_with_collection("corpus").await;

    let docs: Vec<NewDocument> = (0..5)
        .map(|i| NewDocument::new(format!("d{i}"), format!("cancer report number {i}")))
        .collect();
    DocumentQueries::upsert_batch(store.pool(), collection_id, &docs)
        .await
        .expect("insert");

    let results = DocumentQueries::search_keyword(store.pool(), collection_id, "cancer", 3)
        .await
        .expect("search");
    assert_eq!(results.len(), 3);
}
