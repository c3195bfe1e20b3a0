use super::*;
use crate::config::OllamaConfig;

fn test_config() -> OllamaConfig {
    OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        timeout_seconds: 15,
        retry_attempts: 2,
    }
}

#[test]
fn client_configuration() {
    let client = OllamaClient::new(&test_config()).expect("should create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.model_id(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.retry_attempts, 2);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("should create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn empty_input_skips_the_server() {
    // Nothing listens on test-host; an empty batch must not reach the network
    let client = OllamaClient::new(&test_config()).expect("should create client");
    let embeddings = client
        .embed_batch(&[])
        .expect("should embed empty batch without a request");
    assert!(embeddings.is_empty());
}

#[test]
fn request_body_uses_input_field() {
    let inputs = vec!["rust".to_string(), "go".to_string()];
    let request = EmbedRequest {
        model: "test-model",
        inputs: &inputs,
    };
    let json = serde_json::to_value(&request).expect("should serialize request");
    assert_eq!(
        json,
        serde_json::json!({"model": "test-model", "input": ["rust", "go"]})
    );
}
