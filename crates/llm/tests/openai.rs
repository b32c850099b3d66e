//! `OpenAiGenerator` against a fake chat completions endpoint.

use std::time::Duration;

use llm::{OpenAiGenerator, OpenAiSettings};
use pipeline::{GenerationError, Prompt, TextGenerator};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator(server: &MockServer) -> OpenAiGenerator {
    let mut settings = OpenAiSettings::new("sk-test");
    settings.base_url = format!("{}/v1", server.uri());
    OpenAiGenerator::new(settings).unwrap()
}

fn prompt() -> Prompt {
    Prompt {
        system: "You are a technical writer.".into(),
        user: "Update the README.".into(),
    }
}

#[tokio::test]
async fn returns_the_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.6,
            "messages": [
                {"role": "system", "content": "You are a technical writer."},
                {"role": "user", "content": "Update the README."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "# Widgets\nUpdated docs."}, "finish_reason": "stop"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = generator(&server).complete(&prompt()).await.unwrap();
    assert_eq!(text, "# Widgets\nUpdated docs.");
}

#[tokio::test]
async fn missing_content_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = generator(&server).complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Malformed { .. }));
}

#[tokio::test]
async fn rate_limits_carry_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "4"))
        .mount(&server)
        .await;

    let err = generator(&server).complete(&prompt()).await.unwrap_err();
    assert_eq!(
        err,
        GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(4))
        }
    );
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = generator(&server).complete(&prompt()).await.unwrap_err();
    assert_eq!(
        err,
        GenerationError::Rejected {
            status: 401,
            message: "Incorrect API key provided".into()
        }
    );
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = generator(&server).complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Server { status: 500, .. }));
}
