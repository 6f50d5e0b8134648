use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::error::StoreError;

/// External persistence collaborator for per-user daily usage counters.
///
/// Implementations must make `increment` atomic per (user, day); this is
/// the only mutable shared state the core relies on. A counter left over
/// from a previous day reads as zero, the day boundary being the
/// server-local calendar day.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Today's consumption for a user; a stale counter reads as zero.
    async fn count_for_today(&self, user_id: &str) -> Result<u32, StoreError>;

    /// Atomically add one to today's counter, returning the new value.
    /// Rolls the counter over if the stored day is not today.
    async fn increment(&self, user_id: &str) -> Result<u32, StoreError>;
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Clone, Copy)]
struct DayCounter {
    day: NaiveDate,
    count: u32,
}

/// In-process usage store. The day check happens at read time, so a
/// counter from yesterday is superseded rather than deleted.
#[derive(Default)]
pub struct MemoryUsageStore {
    counters: DashMap<String, DayCounter>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn seed(&self, user_id: &str, day: NaiveDate, count: u32) {
        self.counters
            .insert(user_id.to_string(), DayCounter { day, count });
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn count_for_today(&self, user_id: &str) -> Result<u32, StoreError> {
        let today = today();
        Ok(self
            .counters
            .get(user_id)
            .filter(|c| c.day == today)
            .map(|c| c.count)
            .unwrap_or(0))
    }

    async fn increment(&self, user_id: &str) -> Result<u32, StoreError> {
        let today = today();
        let mut entry = self
            .counters
            .entry(user_id.to_string())
            .or_insert(DayCounter {
                day: today,
                count: 0,
            });
        if entry.day != today {
            entry.day = today;
            entry.count = 0;
        }
        entry.count += 1;
        Ok(entry.count)
    }
}
