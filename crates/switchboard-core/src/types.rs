use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level governing both quota and model eligibility.
///
/// Ordering matters: a model with `minimum_tier = Subscriber` is visible
/// to subscribers and admins but never to plain users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    User,
    Subscriber,
    Admin,
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessTier::User => write!(f, "user"),
            AccessTier::Subscriber => write!(f, "subscriber"),
            AccessTier::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for AccessTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(AccessTier::User),
            "subscriber" => Ok(AccessTier::Subscriber),
            "admin" => Ok(AccessTier::Admin),
            other => Err(format!("unknown access tier: {other}")),
        }
    }
}

/// A class of request a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Chat,
    ImageGenerate,
    ImageAnalyze,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Chat => write!(f, "chat"),
            Capability::ImageGenerate => write!(f, "image-generate"),
            Capability::ImageAnalyze => write!(f, "image-analyze"),
        }
    }
}

/// Message role in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Capability-specific request body, uniform across providers.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Chat { messages: Vec<Message> },
    ImageGenerate { prompt: String },
    ImageAnalyze { prompt: String, image: Vec<u8> },
}

impl RequestPayload {
    pub fn capability(&self) -> Capability {
        match self {
            RequestPayload::Chat { .. } => Capability::Chat,
            RequestPayload::ImageGenerate { .. } => Capability::ImageGenerate,
            RequestPayload::ImageAnalyze { .. } => Capability::ImageAnalyze,
        }
    }
}

/// Successful provider output.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Image(Vec<u8>),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&[u8]> {
        match self {
            Content::Image(bytes) => Some(bytes),
            Content::Text(_) => None,
        }
    }
}

/// Failure classes worth retrying on the same candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryReason {
    RateLimited,
    TransientNetwork,
    ServerError,
}

/// Failure classes that disqualify a candidate outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FatalReason {
    Auth,
    ContentRejected,
    UnsupportedCapability,
}

/// Classified outcome of a provider invocation. Adapters never leak raw
/// transport errors past this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    Retryable(RetryReason),
    Fatal(FatalReason),
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFailure::Retryable(RetryReason::RateLimited) => write!(f, "rate limited"),
            ProviderFailure::Retryable(RetryReason::TransientNetwork) => {
                write!(f, "transient network failure")
            }
            ProviderFailure::Retryable(RetryReason::ServerError) => write!(f, "server error"),
            ProviderFailure::Fatal(FatalReason::Auth) => write!(f, "authentication failure"),
            ProviderFailure::Fatal(FatalReason::ContentRejected) => write!(f, "content rejected"),
            ProviderFailure::Fatal(FatalReason::UnsupportedCapability) => {
                write!(f, "unsupported capability")
            }
        }
    }
}

/// Final state of one provider invocation in the attempt trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(ProviderFailure),
}

/// One provider invocation within a routing run. The ordered sequence of
/// attempts is what a caller needs to render "switched from X to Y".
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub provider_id: String,
    pub model_id: String,
    pub started_at: DateTime<Utc>,
    pub latency: Duration,
    pub outcome: AttemptOutcome,
}

/// Terminal result of a routed request. Individual candidate failures
/// never escape as errors; they are absorbed into the attempt trace.
#[derive(Debug)]
pub enum RouteResult {
    /// A usable response, possibly from other than the first-choice candidate.
    Completed {
        content: Content,
        used_model: &'static str,
        degraded: bool,
        attempts: Vec<RequestAttempt>,
    },
    /// Daily limit reached before any provider was contacted.
    QuotaExceeded { used: u32, limit: u32 },
    /// Every eligible candidate was exhausted.
    AllProvidersFailed { attempts: Vec<RequestAttempt> },
    /// The caller abandoned the request; quota was not charged.
    Cancelled { attempts: Vec<RequestAttempt> },
}
