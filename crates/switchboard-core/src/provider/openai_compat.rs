use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tracing::{debug, warn};

use crate::registry::ModelDescriptor;
use crate::types::{
    Capability, Content, FatalReason, Message, ProviderFailure, RequestPayload, RetryReason,
};
use crate::util::http;

use super::{classify_status, classify_transport, ProviderAdapter};

const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// OpenAI-compatible chat-completions adapter.
/// Covers Groq, Cerebras, and OpenRouter, including vision requests via
/// base64 data-URL image parts.
pub struct OpenAiCompatAdapter {
    id: String,
    api_base: String,
    api_keys: Vec<String>,
    key_cursor: AtomicUsize,
    attribution_headers: bool,
}

impl OpenAiCompatAdapter {
    pub fn new(id: impl Into<String>, api_base: String, api_keys: Vec<String>) -> Self {
        Self {
            id: id.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_keys,
            key_cursor: AtomicUsize::new(0),
            attribution_headers: false,
        }
    }

    /// OpenRouter asks callers to identify themselves.
    pub fn with_attribution_headers(mut self) -> Self {
        self.attribution_headers = true;
        self
    }

    fn current_key(&self) -> Option<&str> {
        if self.api_keys.is_empty() {
            return None;
        }
        let idx = self.key_cursor.load(Ordering::Relaxed) % self.api_keys.len();
        Some(&self.api_keys[idx])
    }

    /// Move to the next key after a rate-limited response, so the retry
    /// of this candidate goes out on a fresh key.
    fn rotate_key(&self) {
        if self.api_keys.len() > 1 {
            let next = self.key_cursor.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "{}: rotating to API key #{}",
                self.id,
                next % self.api_keys.len() + 1
            );
        }
    }

    fn chat_body(model_id: &str, messages: &[Message]) -> serde_json::Value {
        json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": DEFAULT_TEMPERATURE,
        })
    }

    fn vision_body(model_id: &str, prompt: &str, image: &[u8]) -> serde_json::Value {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image));
        json!({
            "model": model_id,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": DEFAULT_MAX_TOKENS,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::Chat | Capability::ImageAnalyze)
    }

    async fn invoke(
        &self,
        descriptor: &ModelDescriptor,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> Result<Content, ProviderFailure> {
        let body = match payload {
            RequestPayload::Chat { messages } => Self::chat_body(descriptor.model_id, messages),
            RequestPayload::ImageAnalyze { prompt, image } => {
                Self::vision_body(descriptor.model_id, prompt, image)
            }
            RequestPayload::ImageGenerate { .. } => {
                return Err(ProviderFailure::Fatal(FatalReason::UnsupportedCapability));
            }
        };

        let Some(api_key) = self.current_key() else {
            warn!("{}: no API key available", self.id);
            return Err(ProviderFailure::Fatal(FatalReason::Auth));
        };

        let url = format!("{}/chat/completions", self.api_base);
        debug!("{} request to {} with model {}", self.id, url, descriptor.model_id);

        let mut request = http::client()
            .post(&url)
            .timeout(timeout)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json");
        if self.attribution_headers {
            request = request
                .header("HTTP-Referer", "https://github.com/switchboard")
                .header("X-Title", "switchboard");
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("{} error {}: {}", self.id, status.as_u16(), truncate(&text, 200));
            if status.as_u16() == 429 {
                self.rotate_key();
            }
            return Err(classify_status(status.as_u16()));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport(&e))?;
        parse_chat_response(&data)
    }
}

/// Extract the assistant text from an OpenAI-format response. A malformed
/// body counts as a server fault, not a caller error.
pub fn parse_chat_response(data: &serde_json::Value) -> Result<Content, ProviderFailure> {
    let content = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str());

    match content {
        Some(text) => Ok(Content::Text(text.to_string())),
        None => {
            warn!("unexpected completion response shape: {}", truncate(&data.to_string(), 200));
            Err(ProviderFailure::Retryable(RetryReason::ServerError))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_chat_body_shape() {
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let body = OpenAiCompatAdapter::chat_body("llama-3.3-70b-versatile", &messages);
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn test_vision_body_embeds_data_url() {
        let body = OpenAiCompatAdapter::vision_body("qwen/qwen2.5-vl-32b-instruct", "describe", &[1, 2, 3]);
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "describe");
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(url.ends_with(&BASE64.encode([1u8, 2, 3])));
    }

    #[test]
    fn test_parse_chat_response_ok() {
        let data = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello there" } }]
        });
        let content = parse_chat_response(&data).unwrap();
        assert_eq!(content.as_text(), Some("hello there"));
    }

    #[test]
    fn test_parse_chat_response_malformed_is_retryable() {
        let data = serde_json::json!({ "error": "oops" });
        let err = parse_chat_response(&data).unwrap_err();
        assert_eq!(err, ProviderFailure::Retryable(RetryReason::ServerError));
    }

    #[test]
    fn test_key_rotation_wraps() {
        let adapter = OpenAiCompatAdapter::new(
            "openrouter",
            "https://openrouter.ai/api/v1".into(),
            vec!["k1".into(), "k2".into()],
        );
        assert_eq!(adapter.current_key(), Some("k1"));
        adapter.rotate_key();
        assert_eq!(adapter.current_key(), Some("k2"));
        adapter.rotate_key();
        assert_eq!(adapter.current_key(), Some("k1"));
    }

    #[test]
    fn test_single_key_never_rotates() {
        let adapter =
            OpenAiCompatAdapter::new("groq", "https://api.groq.com/openai/v1".into(), vec!["k".into()]);
        adapter.rotate_key();
        assert_eq!(adapter.current_key(), Some("k"));
    }

    #[tokio::test]
    async fn test_image_generate_unsupported() {
        let adapter =
            OpenAiCompatAdapter::new("groq", "https://api.groq.com/openai/v1".into(), vec!["k".into()]);
        assert!(!adapter.supports(Capability::ImageGenerate));

        let descriptor = crate::registry::find("groq-llama").unwrap();
        let payload = RequestPayload::ImageGenerate { prompt: "cat".into() };
        let err = adapter
            .invoke(descriptor, &payload, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::Fatal(FatalReason::UnsupportedCapability));
    }

    #[test]
    fn test_message_serializes_openai_shape() {
        let msg = Message {
            role: Role::Assistant,
            content: "ok".into(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"], "ok");
    }
}
