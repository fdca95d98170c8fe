use formpilot_common::PilotError;
use formpilot_llm::ollama::OllamaClient;
use formpilot_llm::traits::InferenceClient;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_against(server: &MockServer) -> OllamaClient {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(server)
        .await;

    OllamaClient::new(
        server.uri(),
        "mistral:7b".into(),
        "llava:13b".into(),
        Duration::from_secs(5),
    )
    .await
    .expect("probe succeeds against mock")
}

#[tokio::test]
async fn generate_returns_text_and_token_count() {
    let server = MockServer::start().await;
    let client = client_against(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "mistral:7b", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "{\"attribute\": \"email\"}",
            "eval_count": 17
        })))
        .mount(&server)
        .await;

    let resp = client
        .generate("which attribute?", Some("answer with JSON"), Some(64), Some(0.0))
        .await
        .unwrap();
    assert_eq!(resp.text, "{\"attribute\": \"email\"}");
    assert_eq!(resp.tokens_used, Some(17));
    assert_eq!(resp.model.as_deref(), Some("mistral:7b"));
}

#[tokio::test]
async fn analyze_image_targets_the_vision_model() {
    let server = MockServer::start().await;
    let client = client_against(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llava:13b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "[{\"label\": \"Upload CV\", \"kind\": \"file_upload\"}]"
        })))
        .mount(&server)
        .await;

    let resp = client
        .analyze_image(b"\x89PNG fake bytes", "list the form fields")
        .await
        .unwrap();
    assert!(resp.text.contains("Upload CV"));
    assert_eq!(resp.model.as_deref(), Some("llava:13b"));
}

#[tokio::test]
async fn server_error_is_capability_unavailable() {
    let server = MockServer::start().await;
    let client = client_against(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.generate("p", None, None, None).await.unwrap_err();
    assert!(matches!(err, PilotError::CapabilityUnavailable(_)));
}

#[tokio::test]
async fn slow_server_times_out_as_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(
        server.uri(),
        "mistral:7b".into(),
        "llava:13b".into(),
        Duration::from_millis(200),
    )
    .await
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = client.generate("p", None, None, None).await.unwrap_err();
    assert!(matches!(err, PilotError::Timeout));
}

#[tokio::test]
async fn unreachable_server_fails_construction() {
    let res = OllamaClient::new(
        "http://127.0.0.1:1".into(),
        "mistral:7b".into(),
        "llava:13b".into(),
        Duration::from_secs(1),
    )
    .await;
    assert!(matches!(res, Err(PilotError::CapabilityUnavailable(_))));
}
