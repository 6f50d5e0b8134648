pub mod store;

pub use store::{MemoryUsageStore, UsageStore};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::AccessTier;

/// Daily allowance for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPolicy {
    Limited(u32),
    Unlimited,
}

/// Configurable daily limits for the finite tiers. Admin is always
/// unlimited and cannot be configured otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub user: u32,
    pub subscriber: u32,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            user: 3,
            subscriber: 5,
        }
    }
}

impl TierLimits {
    /// Invariant: a subscriber allowance is never below the user allowance.
    pub fn new(user: u32, subscriber: u32) -> Self {
        if subscriber < user {
            warn!(
                user,
                subscriber, "subscriber daily limit below user limit, raising to match"
            );
            return Self {
                user,
                subscriber: user,
            };
        }
        Self { user, subscriber }
    }

    pub fn policy_for(&self, tier: AccessTier) -> QuotaPolicy {
        match tier {
            AccessTier::User => QuotaPolicy::Limited(self.user),
            AccessTier::Subscriber => QuotaPolicy::Limited(self.subscriber),
            AccessTier::Admin => QuotaPolicy::Unlimited,
        }
    }
}

/// Outcome of a quota check. An `Allowed` decision carries a provisional
/// hold that must be committed after a successful provider response.
pub enum QuotaDecision {
    Allowed {
        reservation: Reservation,
        /// Allowance left after this reservation; `None` means unlimited.
        remaining: Option<u32>,
    },
    Denied {
        used: u32,
        limit: u32,
    },
}

/// Snapshot of a user's consumption, for status surfaces.
#[derive(Debug, Clone, Copy)]
pub struct QuotaStatus {
    pub used: u32,
    /// `None` means unlimited.
    pub limit: Option<u32>,
}

struct UserSlot {
    /// Serializes the read-check-reserve sequence and commits for one
    /// user, so two in-flight requests cannot both pass against a stale
    /// count.
    gate: Mutex<()>,
    /// Reservations admitted but not yet committed or released.
    pending: AtomicU32,
}

struct LedgerInner {
    store: Arc<dyn UsageStore>,
    limits: TierLimits,
    slots: DashMap<String, Arc<UserSlot>>,
}

impl LedgerInner {
    fn slot(&self, user_id: &str) -> Arc<UserSlot> {
        self.slots
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(UserSlot {
                    gate: Mutex::new(()),
                    pending: AtomicU32::new(0),
                })
            })
            .clone()
    }
}

/// Tracks per-user daily consumption against the tier's limit.
///
/// The durable counter is incremented only by [`Reservation::commit`],
/// after a provider attempt succeeds; a failed or abandoned request never
/// touches it, so no rollback path exists.
#[derive(Clone)]
pub struct QuotaLedger {
    inner: Arc<LedgerInner>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn UsageStore>, limits: TierLimits) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                store,
                limits,
                slots: DashMap::new(),
            }),
        }
    }

    /// Check today's consumption and, if allowed, take a provisional hold.
    /// The hold does not increment the counter.
    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        tier: AccessTier,
    ) -> Result<QuotaDecision, StoreError> {
        let slot = self.inner.slot(user_id);
        let _gate = slot.gate.lock().await;

        let used = self.inner.store.count_for_today(user_id).await?;
        let pending = slot.pending.load(Ordering::SeqCst);

        let remaining = match self.inner.limits.policy_for(tier) {
            QuotaPolicy::Unlimited => None,
            QuotaPolicy::Limited(limit) => {
                if used + pending >= limit {
                    debug!(user_id, used, pending, limit, "quota exhausted");
                    return Ok(QuotaDecision::Denied { used, limit });
                }
                Some(limit - (used + pending + 1))
            }
        };

        slot.pending.fetch_add(1, Ordering::SeqCst);
        Ok(QuotaDecision::Allowed {
            reservation: Reservation {
                inner: self.inner.clone(),
                slot: slot.clone(),
                user_id: user_id.to_string(),
                committed: false,
            },
            remaining,
        })
    }

    /// Current consumption snapshot; does not reserve anything.
    pub async fn status(&self, user_id: &str, tier: AccessTier) -> Result<QuotaStatus, StoreError> {
        let used = self.inner.store.count_for_today(user_id).await?;
        let limit = match self.inner.limits.policy_for(tier) {
            QuotaPolicy::Unlimited => None,
            QuotaPolicy::Limited(limit) => Some(limit),
        };
        Ok(QuotaStatus { used, limit })
    }
}

/// Provisional hold on one unit of today's allowance.
///
/// Dropping an uncommitted reservation releases the hold without touching
/// the durable counter.
pub struct Reservation {
    inner: Arc<LedgerInner>,
    slot: Arc<UserSlot>,
    user_id: String,
    committed: bool,
}

impl Reservation {
    /// Convert the hold into a durable increment of today's counter.
    /// Called exactly once, after a provider attempt succeeds.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        let _gate = self.slot.gate.lock().await;
        self.inner.store.increment(&self.user_id).await?;
        self.slot.pending.fetch_sub(1, Ordering::SeqCst);
        self.committed = true;
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            // Releasing a hold never touches the counter; it can only make
            // concurrent admission more permissive, which is correct since
            // this request consumed nothing.
            self.slot.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
