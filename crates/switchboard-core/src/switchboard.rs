use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::provider::{build_adapters, ProviderAdapter};
use crate::quota::{
    MemoryUsageStore, QuotaDecision, QuotaLedger, QuotaStatus, TierLimits, UsageStore,
};
use crate::router::{FallbackPlan, FallbackRouter, RouterOutcome};
use crate::types::{AccessTier, RequestPayload, RouteResult};

/// Front door for routed requests: quota admission, then sequential
/// fallback across eligible providers.
///
/// Quota is charged only after a provider succeeds. A denied, failed, or
/// cancelled request leaves the daily counter untouched.
pub struct Switchboard {
    ledger: QuotaLedger,
    router: FallbackRouter,
}

impl Switchboard {
    pub fn new(
        store: Arc<dyn UsageStore>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        config: &Config,
    ) -> Self {
        let limits = TierLimits::new(
            config.quota.user_daily_limit,
            config.quota.subscriber_daily_limit,
        );
        Self {
            ledger: QuotaLedger::new(store, limits),
            router: FallbackRouter::new(adapters, &config.routing),
        }
    }

    /// Build with the in-process usage store and adapters for every
    /// provider the config has credentials for.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(MemoryUsageStore::new()),
            build_adapters(config),
            config,
        )
    }

    /// Route one request for a user. The capability is taken from the
    /// payload; `preferred` names a registry key to try first.
    pub async fn route(
        &self,
        user_id: &str,
        tier: AccessTier,
        preferred: Option<&str>,
        payload: RequestPayload,
        cancel: &CancellationToken,
    ) -> Result<RouteResult> {
        let capability = payload.capability();

        let reservation = match self.ledger.check_and_reserve(user_id, tier).await? {
            QuotaDecision::Allowed { reservation, .. } => reservation,
            QuotaDecision::Denied { used, limit } => {
                info!(user_id, %tier, used, limit, "request denied by quota");
                return Ok(RouteResult::QuotaExceeded { used, limit });
            }
        };

        let plan = FallbackPlan::build(tier, capability, preferred);
        if plan.is_empty() {
            warn!(user_id, %tier, %capability, "no eligible models");
            return Ok(RouteResult::AllProvidersFailed {
                attempts: Vec::new(),
            });
        }

        match self.router.run(&plan, &payload, cancel).await {
            RouterOutcome::Succeeded {
                content,
                used,
                candidate_index,
                attempts,
            } => {
                reservation.commit().await?;
                Ok(RouteResult::Completed {
                    content,
                    used_model: used.key,
                    degraded: candidate_index > 0,
                    attempts,
                })
            }
            RouterOutcome::Exhausted { attempts } => {
                warn!(user_id, %capability, tried = attempts.len(), "all providers failed");
                Ok(RouteResult::AllProvidersFailed { attempts })
            }
            RouterOutcome::Cancelled { attempts } => {
                info!(user_id, tried = attempts.len(), "request cancelled");
                Ok(RouteResult::Cancelled { attempts })
            }
        }
    }

    /// Consumption snapshot for status surfaces; reserves nothing.
    pub async fn quota_status(&self, user_id: &str, tier: AccessTier) -> Result<QuotaStatus> {
        Ok(self.ledger.status(user_id, tier).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelDescriptor;
    use crate::types::{
        Capability, Content, FatalReason, Message, ProviderFailure, RetryReason,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedAdapter {
        id: &'static str,
        script: Mutex<VecDeque<std::result::Result<Content, ProviderFailure>>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(
            id: &'static str,
            script: Vec<std::result::Result<Content, ProviderFailure>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> &str {
            self.id
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }

        async fn invoke(
            &self,
            _descriptor: &ModelDescriptor,
            _payload: &RequestPayload,
            _timeout: Duration,
        ) -> std::result::Result<Content, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Content::Text("ok".into())))
        }
    }

    fn chat_payload() -> RequestPayload {
        RequestPayload::Chat {
            messages: vec![Message::user("hello")],
        }
    }

    fn board_with(
        store: Arc<MemoryUsageStore>,
        adapters: Vec<(&str, Arc<dyn ProviderAdapter>)>,
    ) -> Switchboard {
        let map = adapters
            .into_iter()
            .map(|(id, a)| (id.to_string(), a))
            .collect();
        Switchboard::new(store, map, &Config::default())
    }

    #[tokio::test]
    async fn test_quota_exceeded_contacts_no_provider() {
        let store = Arc::new(MemoryUsageStore::new());
        for _ in 0..3 {
            store.increment("u1").await.unwrap();
        }
        let groq = ScriptedAdapter::new("groq", vec![]);
        let board = board_with(store.clone(), vec![("groq", groq.clone())]);

        let result = board
            .route("u1", AccessTier::User, None, chat_payload(), &CancellationToken::new())
            .await
            .unwrap();

        match result {
            RouteResult::QuotaExceeded { used, limit } => {
                assert_eq!(used, 3);
                assert_eq!(limit, 3);
            }
            other => panic!("expected quota exceeded, got {other:?}"),
        }
        assert_eq!(groq.calls(), 0);
        assert_eq!(store.count_for_today("u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_admin_never_quota_limited() {
        let store = Arc::new(MemoryUsageStore::new());
        for _ in 0..50 {
            store.increment("root").await.unwrap();
        }
        let groq = ScriptedAdapter::new("groq", vec![Ok(Content::Text("yes".into()))]);
        let board = board_with(store.clone(), vec![("groq", groq)]);

        let result = board
            .route("root", AccessTier::Admin, None, chat_payload(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result, RouteResult::Completed { .. }));
    }

    #[tokio::test]
    async fn test_success_commits_exactly_one_unit() {
        let store = Arc::new(MemoryUsageStore::new());
        let groq = ScriptedAdapter::new("groq", vec![Ok(Content::Text("hi".into()))]);
        let board = board_with(store.clone(), vec![("groq", groq)]);

        let result = board
            .route("u1", AccessTier::User, Some("groq-llama"), chat_payload(), &CancellationToken::new())
            .await
            .unwrap();

        match result {
            RouteResult::Completed {
                used_model,
                degraded,
                attempts,
                ..
            } => {
                assert_eq!(used_model, "groq-llama");
                assert!(!degraded);
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("expected completed, got {other:?}"),
        }
        assert_eq!(store.count_for_today("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_degraded_fallback_still_charges_once() {
        let store = Arc::new(MemoryUsageStore::new());
        let groq = ScriptedAdapter::new(
            "groq",
            vec![Err(ProviderFailure::Fatal(FatalReason::Auth))],
        );
        let cerebras = ScriptedAdapter::new("cerebras", vec![Ok(Content::Text("backup".into()))]);
        let board = board_with(store.clone(), vec![("groq", groq), ("cerebras", cerebras)]);

        let result = board
            .route("u1", AccessTier::User, Some("groq-llama"), chat_payload(), &CancellationToken::new())
            .await
            .unwrap();

        match result {
            RouteResult::Completed {
                used_model,
                degraded,
                ..
            } => {
                assert_eq!(used_model, "cerebras-llama");
                assert!(degraded);
            }
            other => panic!("expected completed, got {other:?}"),
        }
        assert_eq!(store.count_for_today("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_run_charges_nothing() {
        let store = Arc::new(MemoryUsageStore::new());
        // Every chat provider fails fatally.
        let groq = ScriptedAdapter::new(
            "groq",
            vec![
                Err(ProviderFailure::Fatal(FatalReason::Auth)),
                Err(ProviderFailure::Fatal(FatalReason::Auth)),
            ],
        );
        let cerebras = ScriptedAdapter::new(
            "cerebras",
            vec![Err(ProviderFailure::Fatal(FatalReason::Auth))],
        );
        let openrouter = ScriptedAdapter::new(
            "openrouter",
            vec![
                Err(ProviderFailure::Fatal(FatalReason::Auth)),
                Err(ProviderFailure::Fatal(FatalReason::Auth)),
                Err(ProviderFailure::Fatal(FatalReason::Auth)),
            ],
        );
        let board = board_with(
            store.clone(),
            vec![("groq", groq), ("cerebras", cerebras), ("openrouter", openrouter)],
        );

        let result = board
            .route("u1", AccessTier::User, None, chat_payload(), &CancellationToken::new())
            .await
            .unwrap();

        match result {
            RouteResult::AllProvidersFailed { attempts } => {
                assert!(!attempts.is_empty());
            }
            other => panic!("expected all providers failed, got {other:?}"),
        }
        assert_eq!(store.count_for_today("u1").await.unwrap(), 0);

        // The failed run released its hold: the next request is admitted.
        let groq2 = ScriptedAdapter::new("groq", vec![Ok(Content::Text("ok".into()))]);
        let board2 = board_with(store.clone(), vec![("groq", groq2)]);
        let result = board2
            .route("u1", AccessTier::User, None, chat_payload(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result, RouteResult::Completed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_run_charges_nothing() {
        let store = Arc::new(MemoryUsageStore::new());
        let groq = ScriptedAdapter::new("groq", vec![]);
        let board = board_with(store.clone(), vec![("groq", groq.clone())]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = board
            .route("u1", AccessTier::User, None, chat_payload(), &cancel)
            .await
            .unwrap();
        assert!(matches!(result, RouteResult::Cancelled { .. }));
        assert_eq!(groq.calls(), 0);
        assert_eq!(store.count_for_today("u1").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_then_fallback_end_to_end() {
        let store = Arc::new(MemoryUsageStore::new());
        let groq = ScriptedAdapter::new(
            "groq",
            vec![
                Err(ProviderFailure::Retryable(RetryReason::RateLimited)),
                Err(ProviderFailure::Retryable(RetryReason::RateLimited)),
                Err(ProviderFailure::Retryable(RetryReason::RateLimited)),
            ],
        );
        let cerebras = ScriptedAdapter::new("cerebras", vec![Ok(Content::Text("backup".into()))]);
        let board = board_with(
            store.clone(),
            vec![("groq", groq.clone()), ("cerebras", cerebras.clone())],
        );

        let result = board
            .route("u1", AccessTier::User, Some("groq-llama"), chat_payload(), &CancellationToken::new())
            .await
            .unwrap();

        match result {
            RouteResult::Completed {
                used_model,
                degraded,
                attempts,
                ..
            } => {
                assert_eq!(used_model, "cerebras-llama");
                assert!(degraded);
                // Default retry bound of 2: three tries, then fallback.
                assert_eq!(attempts.len(), 4);
            }
            other => panic!("expected completed, got {other:?}"),
        }
        assert_eq!(groq.calls(), 3);
        assert_eq!(store.count_for_today("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_quota_status_passthrough() {
        let store = Arc::new(MemoryUsageStore::new());
        store.increment("u1").await.unwrap();
        let board = board_with(store, vec![]);

        let status = board.quota_status("u1", AccessTier::User).await.unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.limit, Some(3));

        let admin = board.quota_status("u1", AccessTier::Admin).await.unwrap();
        assert_eq!(admin.limit, None);
    }
}
