//! OpenAI chat completions client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{GenerationError, Prompt, TextGenerator};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.6;

/// Connection settings for [`OpenAiGenerator`].
#[derive(Clone, PartialEq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl OpenAiSettings {
    /// Settings with the default model, endpoint and temperature.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum GeneratorBuildError {
    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,

    #[error("model name must not be empty")]
    EmptyModel,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// [`TextGenerator`] backed by the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    http: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(settings: OpenAiSettings) -> Result<Self, GeneratorBuildError> {
        if settings.model.trim().is_empty() {
            return Err(GeneratorBuildError::EmptyModel);
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|_| GeneratorBuildError::InvalidApiKey)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(concat!("autodoc/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model,
            temperature: settings.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.user.len()))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!(%status, "chat completion response");
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, retry_after, &body));
        }

        let body: ChatResponse = response.json().await.map_err(|e| GenerationError::Malformed {
            message: e.to_string(),
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed {
                message: "response has no message content".into(),
            })
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> GenerationError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned());
    let code = status.as_u16();

    match code {
        429 => GenerationError::RateLimited { retry_after },
        500..=599 => GenerationError::Server {
            status: code,
            message,
        },
        _ => GenerationError::Rejected {
            status: code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_is_extracted_from_openai_envelope() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, None, body),
            GenerationError::Rejected {
                status: 401,
                message: "Incorrect API key provided".into()
            }
        );
    }

    #[test]
    fn status_classes() {
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(1)), ""),
            GenerationError::RateLimited {
                retry_after: Some(_)
            }
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, None, "oops"),
            GenerationError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, None, "{}"),
            GenerationError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn empty_model_is_rejected() {
        let mut settings = OpenAiSettings::new("key");
        settings.model = " ".into();
        assert!(matches!(
            OpenAiGenerator::new(settings),
            Err(GeneratorBuildError::EmptyModel)
        ));
    }
}
