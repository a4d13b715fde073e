use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 384,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_backoff(Duration::from_millis(5));

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.backoff_unit, Duration::from_millis(5));
}

#[test]
fn zero_retry_attempts_still_tries_once() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_retry_attempts(0);

    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn empty_batch_needs_no_request() {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let result = client
        .generate_embeddings_batch(&[])
        .expect("empty input should not hit the network");
    assert!(result.is_empty());
}

#[test]
fn embed_request_serializes_input_array() {
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let request = EmbedRequest {
        model: "nomic-embed-text",
        input: &texts,
    };

    let json = serde_json::to_value(&request).expect("request should serialize");
    assert_eq!(json["model"], "nomic-embed-text");
    assert_eq!(json["input"][1], "beta");
}

#[tokio::test]
async fn unreachable_server_is_embedding_unavailable() {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_retry_attempts(1)
        .with_timeout(Duration::from_secs(2));

    let result = client.embed("hello").await;
    assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
}
