#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Sync round trip: upload a populated store and index, replay the captured
// artifacts from a second endpoint, and verify the downloaded copies are
// usable with their document count intact.

use tempfile::TempDir;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use medsearch::database::sqlite::{DocumentStore, NewDocument};
use medsearch::database::vector::{VectorStore, normalize};
use medsearch::sync::{SyncClient, UploadOptions};

const DIM: usize = 2;

async fn populate(dir: &TempDir) -> DocumentStore {
    let store = DocumentStore::open_in_dir(dir.path()).await.expect("store");
    store
        .insert_docs(
            "trials",
            &[
                NewDocument::new("nct-001", "Phase 3 trial of imatinib in CML"),
                NewDocument::new("nct-002", "Phase 2 trial of metformin in prediabetes"),
            ],
        )
        .await
        .expect("insert");

    let docs = store.fetch_docs("trials", None).await.expect("fetch");
    let ids: Vec<i64> = docs.iter().map(|d| d.id).collect();
    let mut embeddings = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
    for vector in &mut embeddings {
        normalize(vector);
    }

    let mut vectors = VectorStore::new(dir.path().join("vectors")).expect("vectors");
    vectors.load_index("trials", DIM).expect("load");
    vectors
        .add_embeddings("trials", &ids, &embeddings)
        .expect("index");

    store
}

#[tokio::test]
async fn upload_download_round_trip_restores_document_count() {
    let source_dir = TempDir::new().expect("source dir");
    let store = populate(&source_dir).await;
    store.close().await;

    // Capture the uploaded artifacts.
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&upstream)
        .await;

    let sync = SyncClient::new(Url::parse(&upstream.uri()).expect("uri"), None).expect("client");
    let db_path = source_dir.path().join("store.db");
    let index_path = source_dir.path().join("vectors").join("trials.vec");
    let (db_clone, index_clone) = (db_path.clone(), index_path.clone());
    tokio::task::spawn_blocking(move || {
        sync.upload(
            "acme/datasets",
            "trials",
            &db_clone,
            &index_clone,
            &UploadOptions::default(),
        )
    })
    .await
    .expect("join")
    .expect("upload");

    let requests = upstream.received_requests().await.expect("requests");
    let body_for = |suffix: &str| {
        requests
            .iter()
            .find(|r| r.url.path().ends_with(suffix))
            .map(|r| r.body.clone())
            .expect("uploaded artifact")
    };
    let db_bytes = body_for("/store.db");
    let index_bytes = body_for("/trials.vec");
    assert_eq!(db_bytes, std::fs::read(&db_path).expect("db bytes"));
    assert_eq!(index_bytes, std::fs::read(&index_path).expect("index bytes"));

    // Serve the captured artifacts back from a fresh endpoint.
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path("/repos/acme/datasets/trials/store.db"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(db_bytes))
        .mount(&downstream)
        .await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path("/repos/acme/datasets/trials/trials.vec"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(index_bytes))
        .mount(&downstream)
        .await;

    let target_dir = TempDir::new().expect("target dir");
    let target_db = target_dir.path().join("store.db");
    let target_index = target_dir.path().join("vectors").join("trials.vec");
    let sync = SyncClient::new(Url::parse(&downstream.uri()).expect("uri"), None).expect("client");
    let (db_clone, index_clone) = (target_db.clone(), target_index.clone());
    tokio::task::spawn_blocking(move || {
        sync.download("acme/datasets", "trials", &db_clone, &index_clone)
    })
    .await
    .expect("join")
    .expect("download");

    // The downloaded pair is a working store and index.
    let restored = DocumentStore::new(&target_db).await.expect("restored store");
    assert_eq!(restored.count_documents("trials").await.expect("count"), 2);

    let mut vectors = VectorStore::new(target_dir.path().join("vectors")).expect("vectors");
    vectors.load_index("trials", DIM).expect("reload");
    assert_eq!(vectors.len("trials").expect("len"), 2);

    restored.close().await;
}
