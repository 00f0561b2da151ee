//! Client for the hosted chat-completion API (OpenAI-compatible, e.g. Groq).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::UpstreamError;

/// Send one prompt, get one text completion back.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct GroqClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GroqClient {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[async_trait]
impl CompletionClient for GroqClient {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(UpstreamError::Auth(StatusCode::UNAUTHORIZED.as_u16()));
        };

        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens: self.config.max_output_tokens,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))?;

        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| UpstreamError::InvalidBody("no completion content".to_string()))
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

/// Map a non-success HTTP status (and its body) onto the retry taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    let code = status.as_u16();
    let snippet: String = body.chars().take(200).collect();

    if status == StatusCode::TOO_MANY_REQUESTS || body.to_lowercase().contains("rate limit") {
        return UpstreamError::RateLimited(snippet);
    }
    match status {
        StatusCode::REQUEST_TIMEOUT => UpstreamError::Timeout,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Auth(code),
        s if s.is_server_error() => UpstreamError::Server(code),
        _ => UpstreamError::BadRequest(code, snippet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            UpstreamError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "Rate limit reached for model"),
            UpstreamError::RateLimited(_)
        ));
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "invalid api key"),
            UpstreamError::Auth(401)
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            UpstreamError::Server(503)
        );
        assert_eq!(
            classify_status(StatusCode::REQUEST_TIMEOUT, ""),
            UpstreamError::Timeout
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "context length exceeded"),
            UpstreamError::BadRequest(400, _)
        ));
    }

    #[test]
    fn test_chat_request_shape() {
        let payload = ChatRequest {
            model: "mixtral-8x7b-32768",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.0,
            max_tokens: 2000,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["model"], "mixtral-8x7b-32768");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 2000);
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"1. positive,0.9"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("1. positive,0.9")
        );
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_network() {
        let client = GroqClient::new(LlmConfig {
            api_key: None,
            api_url: "http://127.0.0.1:9/unreachable".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert!(!client.has_credential());
        assert_eq!(client.complete("hi").await, Err(UpstreamError::Auth(401)));
    }
}
