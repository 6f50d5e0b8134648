use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::provider::ProviderAdapter;
use crate::registry::{self, ModelDescriptor};
use crate::types::{
    AccessTier, AttemptOutcome, Capability, Content, FatalReason, ProviderFailure, RequestAttempt,
    RequestPayload,
};

/// Retry bound and backoff curve for a single candidate. Randomness is
/// confined to the jitter here; plan construction is deterministic.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter; `retry` counts from 1.
    fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let exp = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis() as u64 / 2);
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Per-candidate invocation timeouts, by capability.
#[derive(Debug, Clone)]
pub struct InvokeTimeouts {
    pub chat: Duration,
    pub image_generate: Duration,
    pub image_analyze: Duration,
}

impl InvokeTimeouts {
    fn for_capability(&self, capability: Capability) -> Duration {
        match capability {
            Capability::Chat => self.chat,
            Capability::ImageGenerate => self.image_generate,
            Capability::ImageAnalyze => self.image_analyze,
        }
    }
}

/// Ordered candidate list for one request. The preferred model moves to
/// position 0 when eligible; an ineligible preferred model is dropped,
/// not demoted.
#[derive(Debug)]
pub struct FallbackPlan {
    pub capability: Capability,
    pub candidates: Vec<&'static ModelDescriptor>,
}

impl FallbackPlan {
    pub fn build(tier: AccessTier, capability: Capability, preferred: Option<&str>) -> Self {
        let mut candidates = registry::eligible_models(tier, capability);
        if let Some(key) = preferred {
            if let Some(pos) = candidates.iter().position(|m| m.key == key) {
                let preferred = candidates.remove(pos);
                candidates.insert(0, preferred);
            } else {
                debug!(key, %tier, "preferred model not eligible, dropped from plan");
            }
        }
        Self {
            capability,
            candidates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Terminal state of a routing run, with the full ordered attempt trace.
#[derive(Debug)]
pub enum RouterOutcome {
    Succeeded {
        content: Content,
        used: &'static ModelDescriptor,
        /// Position in the plan; > 0 means the result is degraded.
        candidate_index: usize,
        attempts: Vec<RequestAttempt>,
    },
    Exhausted {
        attempts: Vec<RequestAttempt>,
    },
    Cancelled {
        attempts: Vec<RequestAttempt>,
    },
}

/// Drives sequential attempts through candidate providers: backoff
/// between retries of the same candidate, no delay between different
/// candidates, stop at first success. Never touches quota state.
pub struct FallbackRouter {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    retry: RetryPolicy,
    timeouts: InvokeTimeouts,
}

impl FallbackRouter {
    pub fn new(
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        routing: &RoutingConfig,
    ) -> Self {
        Self {
            adapters,
            retry: RetryPolicy {
                max_retries: routing.max_retries,
                base_delay: Duration::from_millis(routing.backoff_base_ms),
                max_delay: Duration::from_millis(routing.backoff_max_ms),
            },
            timeouts: InvokeTimeouts {
                chat: Duration::from_secs(routing.chat_timeout_secs),
                image_generate: Duration::from_secs(routing.image_generate_timeout_secs),
                image_analyze: Duration::from_secs(routing.image_analyze_timeout_secs),
            },
        }
    }

    pub async fn run(
        &self,
        plan: &FallbackPlan,
        payload: &RequestPayload,
        cancel: &CancellationToken,
    ) -> RouterOutcome {
        let timeout = self.timeouts.for_capability(plan.capability);
        let mut attempts: Vec<RequestAttempt> = Vec::new();

        for (candidate_index, descriptor) in plan.candidates.iter().copied().enumerate() {
            let Some(adapter) = self.adapters.get(descriptor.provider_id) else {
                warn!(
                    provider = descriptor.provider_id,
                    model = descriptor.key,
                    "no adapter configured, skipping candidate"
                );
                attempts.push(skipped_attempt(descriptor));
                continue;
            };

            if !adapter.supports(plan.capability) {
                warn!(
                    provider = descriptor.provider_id,
                    model = descriptor.key,
                    capability = %plan.capability,
                    "adapter does not serve this capability, skipping candidate"
                );
                attempts.push(skipped_attempt(descriptor));
                continue;
            }

            let mut retry = 0u32;
            loop {
                if cancel.is_cancelled() {
                    return RouterOutcome::Cancelled { attempts };
                }

                let started_at = Utc::now();
                let clock = Instant::now();
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(model = descriptor.key, "request cancelled mid-flight");
                        return RouterOutcome::Cancelled { attempts };
                    }
                    result = adapter.invoke(descriptor, payload, timeout) => result,
                };
                let latency = clock.elapsed();

                attempts.push(RequestAttempt {
                    provider_id: descriptor.provider_id.to_string(),
                    model_id: descriptor.model_id.to_string(),
                    started_at,
                    latency,
                    outcome: match &result {
                        Ok(_) => AttemptOutcome::Success,
                        Err(failure) => AttemptOutcome::Failed(*failure),
                    },
                });

                match result {
                    Ok(content) => {
                        info!(
                            model = descriptor.key,
                            candidate_index,
                            latency_ms = latency.as_millis() as u64,
                            "candidate succeeded"
                        );
                        return RouterOutcome::Succeeded {
                            content,
                            used: descriptor,
                            candidate_index,
                            attempts,
                        };
                    }
                    Err(ProviderFailure::Retryable(reason)) => {
                        if retry < self.retry.max_retries {
                            retry += 1;
                            let delay = self.retry.delay_for(retry);
                            debug!(
                                model = descriptor.key,
                                ?reason,
                                retry,
                                delay_ms = delay.as_millis() as u64,
                                "retrying candidate after backoff"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    debug!(model = descriptor.key, "request cancelled during backoff");
                                    return RouterOutcome::Cancelled { attempts };
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        } else {
                            warn!(
                                model = descriptor.key,
                                ?reason,
                                "retry bound exhausted, advancing to next candidate"
                            );
                            break;
                        }
                    }
                    Err(ProviderFailure::Fatal(reason)) => {
                        warn!(
                            model = descriptor.key,
                            ?reason,
                            "fatal failure, advancing to next candidate"
                        );
                        break;
                    }
                }
            }
        }

        RouterOutcome::Exhausted { attempts }
    }
}

/// Trace entry for a candidate that was never invoked, either because no
/// adapter is configured for its provider or the adapter does not serve
/// the requested capability.
fn skipped_attempt(descriptor: &ModelDescriptor) -> RequestAttempt {
    RequestAttempt {
        provider_id: descriptor.provider_id.to_string(),
        model_id: descriptor.model_id.to_string(),
        started_at: Utc::now(),
        latency: Duration::ZERO,
        outcome: AttemptOutcome::Failed(ProviderFailure::Fatal(
            FatalReason::UnsupportedCapability,
        )),
    }
}
