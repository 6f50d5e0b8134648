pub mod huggingface;
pub mod openai_compat;
pub mod pollinations;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::registry::ModelDescriptor;
use crate::types::{Capability, Content, FatalReason, ProviderFailure, RequestPayload, RetryReason};

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const CEREBRAS_API_BASE: &str = "https://api.cerebras.ai/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Capability-polymorphic adapter implemented once per backend.
///
/// Adapters hide authentication, request encoding, and rate-limit
/// signaling, and return a classified outcome rather than a raw transport
/// error. They never write to quota or usage state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn supports(&self, capability: Capability) -> bool;

    async fn invoke(
        &self,
        descriptor: &ModelDescriptor,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> Result<Content, ProviderFailure>;
}

/// Map an HTTP status to the uniform failure taxonomy. This single table
/// is what lets the router apply one retry policy across heterogeneous
/// backends.
pub fn classify_status(status: u16) -> ProviderFailure {
    match status {
        429 => ProviderFailure::Retryable(RetryReason::RateLimited),
        401 | 403 => ProviderFailure::Fatal(FatalReason::Auth),
        400 | 422 => ProviderFailure::Fatal(FatalReason::ContentRejected),
        500..=599 => ProviderFailure::Retryable(RetryReason::ServerError),
        // Anything else unexpected is treated as a server-side fault.
        _ => ProviderFailure::Retryable(RetryReason::ServerError),
    }
}

/// Transport-level failures (timeouts, refused connections, DNS) are
/// rarely permanent; only auth and validation errors are fatal.
pub fn classify_transport(err: &reqwest::Error) -> ProviderFailure {
    tracing::debug!("transport failure: {}", err);
    ProviderFailure::Retryable(RetryReason::TransientNetwork)
}

/// Build the adapter set from configuration. Backends without credentials
/// are left out; the router skips registry entries whose provider has no
/// adapter.
pub fn build_adapters(config: &Config) -> HashMap<String, Arc<dyn ProviderAdapter>> {
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();

    let groq = &config.providers.groq;
    if !groq.api_key.is_empty() {
        adapters.insert(
            "groq".to_string(),
            Arc::new(openai_compat::OpenAiCompatAdapter::new(
                "groq",
                groq.api_base.clone().unwrap_or_else(|| GROQ_API_BASE.to_string()),
                vec![groq.api_key.clone()],
            )),
        );
    }

    let cerebras = &config.providers.cerebras;
    if !cerebras.api_key.is_empty() {
        adapters.insert(
            "cerebras".to_string(),
            Arc::new(openai_compat::OpenAiCompatAdapter::new(
                "cerebras",
                cerebras
                    .api_base
                    .clone()
                    .unwrap_or_else(|| CEREBRAS_API_BASE.to_string()),
                vec![cerebras.api_key.clone()],
            )),
        );
    }

    let openrouter = &config.providers.openrouter;
    if !openrouter.api_keys.is_empty() {
        adapters.insert(
            "openrouter".to_string(),
            Arc::new(
                openai_compat::OpenAiCompatAdapter::new(
                    "openrouter",
                    openrouter
                        .api_base
                        .clone()
                        .unwrap_or_else(|| OPENROUTER_API_BASE.to_string()),
                    openrouter.api_keys.clone(),
                )
                .with_attribution_headers(),
            ),
        );
    }

    // Keyless backend, always available.
    adapters.insert(
        "pollinations".to_string(),
        Arc::new(pollinations::PollinationsAdapter::new()),
    );

    // HF works anonymously at a lower rate; register it either way.
    adapters.insert(
        "huggingface".to_string(),
        Arc::new(huggingface::HuggingFaceAdapter::new(
            config.providers.huggingface.api_key.clone(),
        )),
    );

    adapters
}
