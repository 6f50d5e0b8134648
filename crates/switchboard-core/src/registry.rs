use crate::types::{AccessTier, Capability};

/// An immutable (provider, model) pair the router can dispatch to.
///
/// The registry is compiled in rather than stored: model availability
/// changes with deployment, not at runtime.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Registry key callers use to name a preferred model.
    pub key: &'static str,
    /// Adapter this model dispatches through.
    pub provider_id: &'static str,
    /// Model identifier as the backend API expects it.
    pub model_id: &'static str,
    pub capability: Capability,
    pub minimum_tier: AccessTier,
}

/// Declaration order within each capability is the canonical fallback
/// priority: fastest-first for chat, best-quality-eligible-first for
/// image generation.
pub const REGISTRY: &[ModelDescriptor] = &[
    // Chat
    ModelDescriptor {
        key: "groq-llama",
        provider_id: "groq",
        model_id: "llama-3.3-70b-versatile",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "cerebras-llama",
        provider_id: "cerebras",
        model_id: "llama-3.3-70b",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "groq-scout",
        provider_id: "groq",
        model_id: "meta-llama/llama-4-scout-17b-16e-instruct",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "groq-maverick",
        provider_id: "groq",
        model_id: "meta-llama/llama-4-maverick-17b-128e-instruct",
        capability: Capability::Chat,
        minimum_tier: AccessTier::Subscriber,
    },
    ModelDescriptor {
        key: "groq-kimi",
        provider_id: "groq",
        model_id: "moonshotai/kimi-k2-instruct",
        capability: Capability::Chat,
        minimum_tier: AccessTier::Subscriber,
    },
    ModelDescriptor {
        key: "solar",
        provider_id: "openrouter",
        model_id: "upstage/solar-pro-3:free",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "trinity",
        provider_id: "openrouter",
        model_id: "arcee-ai/trinity-mini:free",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "glm",
        provider_id: "openrouter",
        model_id: "z-ai/glm-4.5-air:free",
        capability: Capability::Chat,
        minimum_tier: AccessTier::User,
    },
    // Image generation
    ModelDescriptor {
        key: "flux-hf",
        provider_id: "huggingface",
        model_id: "black-forest-labs/FLUX.1-schnell",
        capability: Capability::ImageGenerate,
        minimum_tier: AccessTier::Subscriber,
    },
    ModelDescriptor {
        key: "flux",
        provider_id: "pollinations",
        model_id: "flux",
        capability: Capability::ImageGenerate,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "turbo",
        provider_id: "pollinations",
        model_id: "turbo",
        capability: Capability::ImageGenerate,
        minimum_tier: AccessTier::User,
    },
    // Image analysis
    ModelDescriptor {
        key: "scout-vision",
        provider_id: "groq",
        model_id: "meta-llama/llama-4-scout-17b-16e-instruct",
        capability: Capability::ImageAnalyze,
        minimum_tier: AccessTier::User,
    },
    ModelDescriptor {
        key: "qwen-vl",
        provider_id: "openrouter",
        model_id: "qwen/qwen2.5-vl-32b-instruct",
        capability: Capability::ImageAnalyze,
        minimum_tier: AccessTier::Subscriber,
    },
    ModelDescriptor {
        key: "qwen-vl-free",
        provider_id: "openrouter",
        model_id: "qwen/qwen2.5-vl-32b-instruct:free",
        capability: Capability::ImageAnalyze,
        minimum_tier: AccessTier::User,
    },
];

/// Models a tier may use for a capability, in fallback priority order.
/// Models above the caller's tier are excluded entirely, never kept as a
/// last resort.
pub fn eligible_models(
    tier: AccessTier,
    capability: Capability,
) -> Vec<&'static ModelDescriptor> {
    REGISTRY
        .iter()
        .filter(|m| m.capability == capability && m.minimum_tier <= tier)
        .collect()
}

/// Look up a descriptor by registry key.
pub fn find(key: &str) -> Option<&'static ModelDescriptor> {
    REGISTRY.iter().find(|m| m.key == key)
}
