//! Anthropic streaming Messages API backend
//!
//! Sends the prior turns plus a system instruction with `stream: true`
//! and decodes the SSE delta stream (`content_block_delta` /
//! `text_delta`) into accumulated reply text, emitting progress chunks
//! as they arrive. The API credential comes from an injected
//! [`CredentialProvider`], never from global state.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{AgentBackend, BackendEvent, SendRequest};
use crate::credentials::CredentialProvider;
use crate::error::{Error, Result};
use crate::message::{Message, MessageRole};
use crate::util::{mask_api_key, truncate_safe};

/// Anthropic API version header value
const API_VERSION: &str = "2023-06-01";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Credential key looked up in the injected provider
pub const API_KEY_CREDENTIAL: &str = "ANTHROPIC_API_KEY";

/// Sanitize API error messages to prevent leaking sensitive information
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("invalid key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
        || lower.contains("x-api-key")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }

    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("overloaded") {
        return "API rate limit exceeded. Please try again later.".to_string();
    }

    if lower.contains("internal") || lower.contains("server error") {
        return "API server error. Please try again later.".to_string();
    }

    if error.len() > 300 {
        format!("{}...(truncated)", truncate_safe(error, 300))
    } else {
        error.to_string()
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    r#type: String,
    message: String,
}

/// One decoded SSE event relevant to reply assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    /// A chunk of assistant text
    Delta(String),
    /// Explicit stop signal
    Stop,
    /// Mid-stream error from the API
    Error(String),
    /// Anything else (ping, block start/stop, usage)
    Skip,
}

/// Decode the JSON payload of one `data:` line
pub(crate) fn parse_sse_data(data: &str) -> StreamEvent {
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return StreamEvent::Skip;
    };

    match json.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let delta = json.get("delta");
            let is_text = delta
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str)
                == Some("text_delta");
            if is_text {
                if let Some(text) = delta
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                {
                    return StreamEvent::Delta(text.to_string());
                }
            }
            StreamEvent::Skip
        }
        Some("message_stop") => StreamEvent::Stop,
        Some("error") => {
            let message = json
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            StreamEvent::Error(sanitize_api_error(message))
        }
        _ => StreamEvent::Skip,
    }
}

// ============================================================================
// Backend Implementation
// ============================================================================

/// Anthropic backend configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Base URL
    pub base_url: String,
    /// Default model
    pub default_model: String,
    /// Default max tokens
    pub default_max_tokens: u32,
    /// Request timeout (covers the whole stream)
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: 4096,
            timeout: Duration::from_secs(300),
        }
    }
}

impl AnthropicConfig {
    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the default max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Streaming Anthropic Messages API backend
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl AnthropicBackend {
    /// Create a new backend with an injected credential provider
    pub fn new(config: AnthropicConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// Convert prior turns plus the new prompt to API messages
    fn build_messages(history: &[Message], prompt: &str) -> Vec<ApiMessage> {
        let mut messages: Vec<ApiMessage> = history
            .iter()
            .filter(|m| m.role != MessageRole::System && !m.content.is_empty())
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();
        messages.push(ApiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        messages
    }
}

#[async_trait::async_trait]
impl AgentBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn is_available(&self) -> bool {
        self.credentials.is_configured(API_KEY_CREDENTIAL)
    }

    async fn send(&self, req: SendRequest<'_>) -> Result<String> {
        let api_key = self.credentials.get(API_KEY_CREDENTIAL).ok_or_else(|| {
            Error::NotConfigured(format!("{API_KEY_CREDENTIAL} is not set"))
        })?;

        let model = req
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model);

        let api_request = ApiRequest {
            model: model.to_string(),
            max_tokens: self.config.default_max_tokens,
            system: (!req.system.is_empty()).then(|| req.system.to_string()),
            messages: Self::build_messages(req.history, req.prompt),
            stream: true,
        };

        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(
            agent_id = %req.agent_id,
            model = %model,
            api_key = %mask_api_key(&api_key),
            "Sending streaming request to Anthropic"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;
            if status.as_u16() == 429 {
                return Err(Error::RateLimit);
            }
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                return Err(Error::Api(sanitize_api_error(&format!(
                    "{}: {}",
                    error.error.r#type, error.error.message
                ))));
            }
            return Err(Error::Api(sanitize_api_error(&format!(
                "HTTP {status}: {body}"
            ))));
        }

        // Decode the SSE stream line by line, carrying partial lines
        // across chunk boundaries
        let mut stream = response.bytes_stream();
        let mut partial = String::new();
        let mut text = String::new();
        let mut stopped = false;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Stream(e.to_string()))?;
            partial.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = partial.find('\n') {
                let line: String = partial.drain(..=pos).collect();
                let line = line.trim_end();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                match parse_sse_data(data) {
                    StreamEvent::Delta(delta) => {
                        req.emit(BackendEvent::TextDelta(delta.clone()));
                        text.push_str(&delta);
                    }
                    StreamEvent::Stop => {
                        stopped = true;
                        break 'outer;
                    }
                    StreamEvent::Error(message) => {
                        return Err(Error::Api(message));
                    }
                    StreamEvent::Skip => {}
                }
            }
        }

        if !stopped {
            if text.is_empty() {
                return Err(Error::Stream(
                    "stream ended before message_stop".to_string(),
                ));
            }
            warn!(agent_id = %req.agent_id, "Stream ended without message_stop; returning accumulated text");
        }

        req.emit(BackendEvent::Done);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialProvider;

    #[test]
    fn test_parse_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hello"}}"#;
        assert_eq!(parse_sse_data(data), StreamEvent::Delta("hello".to_string()));
    }

    #[test]
    fn test_parse_non_text_delta_is_skipped() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(parse_sse_data(data), StreamEvent::Skip);
    }

    #[test]
    fn test_parse_message_stop() {
        assert_eq!(parse_sse_data(r#"{"type":"message_stop"}"#), StreamEvent::Stop);
    }

    #[test]
    fn test_parse_stream_error() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match parse_sse_data(data) {
            StreamEvent::Error(message) => assert!(message.contains("rate limit")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ping_is_skipped() {
        assert_eq!(parse_sse_data(r#"{"type":"ping"}"#), StreamEvent::Skip);
        assert_eq!(parse_sse_data("not json"), StreamEvent::Skip);
    }

    #[test]
    fn test_sanitize_api_error() {
        let sanitized = sanitize_api_error("Invalid x-api-key header");
        assert!(!sanitized.contains("x-api-key"));
        assert!(sanitized.contains("authentication"));

        let sanitized = sanitize_api_error("overloaded: too many requests");
        assert!(sanitized.contains("rate limit"));
    }

    #[test]
    fn test_config_builder() {
        let config = AnthropicConfig::default()
            .with_model("claude-haiku-4-5-20251001")
            .with_max_tokens(2048)
            .with_timeout(Duration::from_secs(30));

        assert_eq!(config.default_model, "claude-haiku-4-5-20251001");
        assert_eq!(config.default_max_tokens, 2048);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_build_messages_appends_prompt() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let messages = AnthropicBackend::build_messages(&history, "how are you?");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "how are you?");
    }

    #[tokio::test]
    async fn test_availability_tracks_credential() {
        let credentials = Arc::new(MemoryCredentialProvider::new());
        let backend =
            AnthropicBackend::new(AnthropicConfig::default(), credentials.clone()).unwrap();

        assert!(!backend.is_available().await);
        credentials.set(API_KEY_CREDENTIAL, "sk-ant-test");
        assert!(backend.is_available().await);
    }
}
