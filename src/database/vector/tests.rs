use super::*;
use tempfile::TempDir;

fn unit(values: &[f32]) -> Vec<f32> {
    let mut v = values.to_vec();
    normalize(&mut v);
    v
}

#[test]
fn add_and_search_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    store.load_index("corpus", 3).expect("load");

    let vectors = vec![
        unit(&[1.0, 0.0, 0.0]),
        unit(&[0.0, 1.0, 0.0]),
        unit(&[1.0, 1.0, 0.0]),
    ];
    store
        .add_embeddings("corpus", &[10, 20, 30], &vectors)
        .expect("add");

    let query = unit(&[1.0, 0.0, 0.0]);
    let results = store.search("corpus", &query, 2).expect("search");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 10);
    assert!((results[0].1 - 1.0).abs() < 1e-5, "self-similarity ≈ 1.0");
    assert_eq!(results[1].0, 30);
    assert!(results[1].1 < results[0].1);
}

#[test]
fn search_before_load_fails() {
    let dir = TempDir::new().expect("tempdir");
    let store = VectorStore::new(dir.path()).expect("store");

    let err = store.search("corpus", &[1.0, 0.0], 5).expect_err("not loaded");
    assert!(matches!(err, SearchError::NotInitialized(_)));
}

#[test]
fn add_before_load_fails() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");

    let err = store
        .add_embeddings("corpus", &[1], &[vec![1.0, 0.0]])
        .expect_err("not loaded");
    assert!(matches!(err, SearchError::NotInitialized(_)));
}

#[test]
fn dimension_mismatch_on_add_and_search() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    store.load_index("corpus", 3).expect("load");

    let err = store
        .add_embeddings("corpus", &[1], &[vec![1.0, 0.0]])
        .expect_err("wrong dim add");
    assert!(matches!(
        err,
        SearchError::DimensionMismatch { expected: 3, actual: 2 }
    ));

    let err = store
        .search("corpus", &[1.0, 0.0, 0.0, 0.0], 5)
        .expect_err("wrong dim search");
    assert!(matches!(
        err,
        SearchError::DimensionMismatch { expected: 3, actual: 4 }
    ));
}

#[test]
fn persisted_dimension_must_match_on_load() {
    let dir = TempDir::new().expect("tempdir");
    {
        let mut store = VectorStore::new(dir.path()).expect("store");
        store.load_index("corpus", 3).expect("load");
        store
            .add_embeddings("corpus", &[1], &[unit(&[1.0, 2.0, 3.0])])
            .expect("add");
    }

    let mut store = VectorStore::new(dir.path()).expect("reopen");
    let err = store.load_index("corpus", 4).expect_err("dim change");
    assert!(matches!(
        err,
        SearchError::DimensionMismatch { expected: 4, actual: 3 }
    ));
}

#[test]
fn snapshot_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    {
        let mut store = VectorStore::new(dir.path()).expect("store");
        store.load_index("corpus", 2).expect("load");
        store
            .add_embeddings("corpus", &[7, 8], &[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])])
            .expect("add");
    }

    let mut store = VectorStore::new(dir.path()).expect("reopen");
    store.load_index("corpus", 2).expect("reload");
    assert_eq!(store.len("corpus").expect("len"), 2);

    let results = store
        .search("corpus", &unit(&[0.0, 1.0]), 1)
        .expect("search");
    assert_eq!(results[0].0, 8);
}

#[test]
fn upsert_overwrites_existing_vector() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    store.load_index("corpus", 2).expect("load");

    store
        .add_embeddings("corpus", &[1], &[unit(&[1.0, 0.0])])
        .expect("add");
    store
        .add_embeddings("corpus", &[1], &[unit(&[0.0, 1.0])])
        .expect("overwrite");

    assert_eq!(store.len("corpus").expect("len"), 1);
    let results = store
        .search("corpus", &unit(&[0.0, 1.0]), 1)
        .expect("search");
    assert_eq!(results[0].0, 1);
    assert!((results[0].1 - 1.0).abs() < 1e-5);
}

#[test]
fn remove_drops_orphans_and_persists() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    store.load_index("corpus", 2).expect("load");

    store
        .add_embeddings(
            "corpus",
            &[1, 2, 3],
            &[unit(&[1.0, 0.0]), unit(&[0.0, 1.0]), unit(&[1.0, 1.0])],
        )
        .expect("add");

    let removed = store.remove("corpus", &[2, 99]).expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(store.ids("corpus").expect("ids"), vec![1, 3]);

    // Snapshot reflects the removal.
    let mut reopened = VectorStore::new(dir.path()).expect("reopen");
    reopened.load_index("corpus", 2).expect("reload");
    assert_eq!(reopened.ids("corpus").expect("ids"), vec![1, 3]);
}

#[test]
fn ties_are_stable_by_insertion_order() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    store.load_index("corpus", 2).expect("load");

    let same = unit(&[1.0, 0.0]);
    store
        .add_embeddings("corpus", &[5, 6], &[same.clone(), same.clone()])
        .expect("add");

    let results = store.search("corpus", &same, 2).expect("search");
    assert_eq!(results[0].0, 5);
    assert_eq!(results[1].0, 6);
}

#[test]
fn normalize_produces_unit_norm() {
    let mut v = vec![3.0, 4.0];
    normalize(&mut v);
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);

    let mut zero = vec![0.0, 0.0];
    normalize(&mut zero);
    assert_eq!(zero, vec![0.0, 0.0]);
}

#[test]
fn zero_dimension_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(dir.path()).expect("store");
    let err = store.load_index("corpus", 0).expect_err("zero dim");
    assert!(matches!(err, SearchError::Validation(_)));
}
