use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo-1106";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Output constraint passed as `response_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .filter(|content| !content.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Error body some providers return with a 200 status.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("API error: {0}")]
    Api(String),
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY").or_else(|| env_string("OPENAI_API_KEY"));
        let model = env_string("LLM_MODEL")
            .or_else(|| env_string("MODEL_NAME"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = env_string("LLM_API_ENDPOINT")
            .or_else(|| env_string("OPENAI_URL"))
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        Self::new(LLMConfig {
            api_key,
            model,
            api_endpoint,
            timeout,
        })
    }

    pub fn new(config: LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<ChatResponse, LLMError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))?;

        let url = chat_url(&self.config.api_endpoint);
        let payload = build_payload(&self.config.model, messages, format);

        self.post_with_retry(&url, api_key, &payload).await
    }

    /// Single user message, first choice content returned.
    pub async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LLMError> {
        let response = self.chat(&[ChatMessage::user(prompt)], format).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(LLMError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LLMError> {
        let mut last_error: Option<LLMError> = None;

        for retry in 0..=MAX_RETRIES {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return parse_chat_response(&bytes);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LLMError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "LLM request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = LLMError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "LLM request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(LLMError::NotConfigured("unknown")))
    }
}

fn build_payload(
    model: &str,
    messages: &[ChatMessage],
    format: ResponseFormat,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": false
    });
    if format == ResponseFormat::JsonObject {
        payload["response_format"] = serde_json::json!({ "type": "json_object" });
    }
    payload
}

fn parse_chat_response(bytes: &[u8]) -> Result<ChatResponse, LLMError> {
    if let Ok(api_error) = serde_json::from_slice::<ApiErrorBody>(bytes) {
        return Err(LLMError::Api(api_error.error.message));
    }
    match serde_json::from_slice::<ChatResponse>(bytes) {
        Ok(response) if response.choices.is_empty() => Err(LLMError::EmptyChoices),
        Ok(response) => Ok(response),
        Err(e) => {
            let body_str = String::from_utf8_lossy(bytes);
            tracing::error!("Failed to parse LLM response JSON: {}. Body: {}", e, body_str);
            Err(LLMError::Json(e))
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

/// The endpoint is used as configured; only a trailing slash is dropped.
fn chat_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim().trim_end_matches('/'))
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_keeps_configured_path() {
        assert_eq!(
            chat_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_url("https://proxy.internal/openai/"),
            "https://proxy.internal/openai/chat/completions"
        );
    }

    #[test]
    fn test_json_object_format_sets_response_format() {
        let payload = build_payload("m", &[ChatMessage::user("hi")], ResponseFormat::JsonObject);
        assert_eq!(payload["response_format"]["type"], "json_object");
        let payload = build_payload("m", &[ChatMessage::user("hi")], ResponseFormat::Text);
        assert!(payload.get("response_format").is_none());
    }

    #[test]
    fn test_api_error_body_is_surfaced() {
        let body = br#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
        match parse_chat_response(body) {
            Err(LLMError::Api(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_choices_rejected() {
        let body = br#"{"model":"m","choices":[]}"#;
        assert!(matches!(parse_chat_response(body), Err(LLMError::EmptyChoices)));
    }

    #[test]
    fn test_first_content_ignores_blank() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#;
        let response = parse_chat_response(body).unwrap();
        assert!(response.first_content().is_none());
    }

    #[test]
    fn test_unconfigured_provider_is_unavailable() {
        let provider = LLMProvider::new(LLMConfig {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            api_endpoint: DEFAULT_API_ENDPOINT.into(),
            timeout: Duration::from_secs(1),
        });
        assert!(!provider.is_available());
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }
}
