use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::registry::ModelDescriptor;
use crate::types::{Capability, Content, FatalReason, ProviderFailure, RequestPayload};
use crate::util::http;

use super::{classify_status, classify_transport, ProviderAdapter};

const API_BASE: &str = "https://image.pollinations.ai/prompt";
const MAX_PROMPT_LEN: usize = 200;

/// Keyless image generation via pollinations.ai. The prompt rides in the
/// URL path, so it is length-capped and percent-encoded.
pub struct PollinationsAdapter;

impl PollinationsAdapter {
    pub fn new() -> Self {
        Self
    }

    fn build_url(model_id: &str, prompt: &str) -> String {
        let mut end = MAX_PROMPT_LEN.min(prompt.len());
        while end > 0 && !prompt.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}/{}?model={}",
            API_BASE,
            urlencoding::encode(&prompt[..end]),
            model_id
        )
    }
}

impl Default for PollinationsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for PollinationsAdapter {
    fn id(&self) -> &str {
        "pollinations"
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::ImageGenerate)
    }

    async fn invoke(
        &self,
        descriptor: &ModelDescriptor,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> Result<Content, ProviderFailure> {
        let RequestPayload::ImageGenerate { prompt } = payload else {
            return Err(ProviderFailure::Fatal(FatalReason::UnsupportedCapability));
        };

        let url = Self::build_url(descriptor.model_id, prompt);
        debug!("pollinations request: {}", url);

        let response = http::client()
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("pollinations error {}", status.as_u16());
            return Err(classify_status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&e))?;
        debug!("pollinations generated {} bytes", bytes.len());
        Ok(Content::Image(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_encodes_prompt() {
        let url = PollinationsAdapter::build_url("flux", "a cat on a roof");
        assert_eq!(
            url,
            "https://image.pollinations.ai/prompt/a%20cat%20on%20a%20roof?model=flux"
        );
    }

    #[test]
    fn test_build_url_caps_prompt_length() {
        let long = "x".repeat(500);
        let url = PollinationsAdapter::build_url("turbo", &long);
        assert!(url.contains(&"x".repeat(MAX_PROMPT_LEN)));
        assert!(!url.contains(&"x".repeat(MAX_PROMPT_LEN + 1)));
    }

    #[test]
    fn test_build_url_respects_char_boundaries() {
        let prompt = "é".repeat(MAX_PROMPT_LEN);
        // Must not panic on a multi-byte boundary.
        let _ = PollinationsAdapter::build_url("flux", &prompt);
    }

    #[tokio::test]
    async fn test_chat_payload_unsupported() {
        let adapter = PollinationsAdapter::new();
        assert!(!adapter.supports(Capability::Chat));

        let descriptor = crate::registry::find("flux").unwrap();
        let payload = RequestPayload::Chat { messages: vec![] };
        let err = adapter
            .invoke(descriptor, &payload, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::Fatal(FatalReason::UnsupportedCapability));
    }
}
