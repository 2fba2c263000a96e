use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32, batch_size: u32) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: "nomic-embed-text".to_string(),
        batch_size,
        embedding_dimension: dimension,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer, dimension: u32, batch_size: u32) -> OllamaClient {
    OllamaClient::new(&config_for(server, dimension, batch_size))
        .expect("client builds")
        .with_retry(RetryPolicy::new(2).with_base_delay(Duration::from_millis(1)))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("client builds");

    assert_eq!(client.model_name(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension(), 384);
    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.retry, RetryPolicy::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_embedding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text", "input": "hello"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, 16);
    let vector = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task joins")
        .expect("embedding succeeds");
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn batches_respect_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2, 2);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task joins")
        .expect("batch succeeds");
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2]]})))
        .mount(&server)
        .await;

    let client = client_for(&server, 768, 16);
    let err = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task joins")
        .expect_err("wrong width");
    assert!(format!("{err:#}").contains("dimension mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = client_for(&server, 1, 16);
    let vector = tokio::task::spawn_blocking(move || client.embed("retry me"))
        .await
        .expect("task joins")
        .expect("second attempt succeeds");
    assert_eq!(vector, vec![1.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn untagged_model_matches_latest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "nomic-embed-text:latest", "size": 274302450}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 768, 16);
    let name = tokio::task::spawn_blocking(move || client.check_model())
        .await
        .expect("task joins")
        .expect("model is available");
    assert_eq!(name, "nomic-embed-text:latest");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_names_what_is_pulled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama3:8b"}]})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 768, 16);
    let err = tokio::task::spawn_blocking(move || client.check_model())
        .await
        .expect("task joins")
        .expect_err("model absent");
    let message = err.to_string();
    assert!(message.contains("llama3:8b"));
    assert!(message.contains("ollama pull nomic-embed-text"));
}

#[test]
fn empty_batch_makes_no_request() {
    let client = OllamaClient::new(&OllamaConfig::default()).expect("client builds");
    let vectors = client.embed_batch(&[]).expect("empty batch");
    assert!(vectors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn proxied_server_keeps_its_mount_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ollama/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"models": [{"name": "nomic-embed-text:latest", "size": 1}]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ollama/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let config = OllamaConfig {
        path: "ollama".to_string(),
        ..config_for(&server, 2, 16)
    };
    let client = OllamaClient::new(&config)
        .expect("client builds")
        .with_retry(RetryPolicy::new(1));
    assert_eq!(client.base_url().path(), "/ollama/");

    let (served, vector) = tokio::task::spawn_blocking(move || {
        (client.check_model(), client.embed("hi"))
    })
    .await
    .expect("task joins");
    assert_eq!(served.expect("model listed"), "nomic-embed-text:latest");
    assert_eq!(vector.expect("embedding succeeds"), vec![0.5, 0.5]);
}
