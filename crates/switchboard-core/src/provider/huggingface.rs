use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::registry::ModelDescriptor;
use crate::types::{Capability, Content, FatalReason, ProviderFailure, RequestPayload};
use crate::util::http;

use super::{classify_status, classify_transport, ProviderAdapter};

const API_BASE: &str = "https://api-inference.huggingface.co/models";

/// Hugging Face inference API image generation. Works anonymously at a
/// reduced rate; a 503 means the model is still warming up.
pub struct HuggingFaceAdapter {
    api_key: String,
}

impl HuggingFaceAdapter {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

#[async_trait]
impl ProviderAdapter for HuggingFaceAdapter {
    fn id(&self) -> &str {
        "huggingface"
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

        let url = format!("{}/{}", API_BASE, descriptor.model_id);
        debug!("huggingface request to {}", url);

        let mut request = http::client()
            .post(&url)
            .timeout(timeout)
            .json(&json!({ "inputs": prompt }));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("huggingface error {}: {}", status.as_u16(), text);
            // A 503 here usually means the model is still warming; it
            // classifies as retryable, so the router's backoff gives it
            // time to load.
            return Err(classify_status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&e))?;
        debug!("huggingface generated {} bytes", bytes.len());
        Ok(Content::Image(bytes.to_vec()))
    }
}
