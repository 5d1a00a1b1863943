use super::*;
use crate::embeddings::EmbeddingClient;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server_uri: &str) -> OpenAiClient {
    let endpoint = Url::parse(&format!("{server_uri}/v1/embeddings")).expect("endpoint");
    OpenAiClient::new_openai("sk-test", "text-embedding-3-small")
        .expect("client")
        .with_endpoint(endpoint)
        .with_retry_attempts(1)
}

#[tokio::test]
async fn embeds_batch_and_orders_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "text-embedding-3-small"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                { "embedding": [0.0, 1.0], "index": 1 },
                { "embedding": [1.0, 0.0], "index": 0 }
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let texts = vec!["first".to_string(), "second".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("join")
        .expect("embed");

    // Response arrives out of order; the client restores input order.
    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn azure_uses_deployment_url_and_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/my-deploy/embeddings"))
        .and(header("api-key", "azure-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [ { "embedding": [0.5, 0.5], "index": 0 } ]
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new_azure(&server.uri(), "azure-secret", "my-deploy")
        .expect("client")
        .with_retry_attempts(1);
    assert_eq!(client.model(), "my-deploy");

    let texts = vec!["query".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("join")
        .expect("embed");
    assert_eq!(embeddings.len(), 1);
}

#[tokio::test]
async fn count_mismatch_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [ { "embedding": [0.5], "index": 0 } ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let texts = vec!["a".to_string(), "b".to_string()];
    let err = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("join")
        .expect_err("mismatch");
    assert!(matches!(err, SearchError::Provider(_)));
}

#[tokio::test]
async fn client_error_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri()).with_retry_attempts(3);
    let texts = vec!["a".to_string()];
    let err = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("join")
        .expect_err("unauthorized");
    assert!(matches!(err, SearchError::Provider(_)));
}

#[tokio::test]
async fn server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri()).with_retry_attempts(2);
    let texts = vec!["a".to_string()];
    let err = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("join")
        .expect_err("service unavailable");
    assert!(matches!(err, SearchError::Provider(_)));
}

#[tokio::test]
async fn empty_input_short_circuits() {
    let client = test_client("http://localhost:1");
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&[]))
        .await
        .expect("join")
        .expect("embed");
    assert!(embeddings.is_empty());
}
