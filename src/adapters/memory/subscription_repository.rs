use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, Subscription, SubscriptionChange};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{MergeOutcome, SubscriptionRepository};

/// Subscription records keyed by user id.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    records: RwLock<HashMap<UserId, Subscription>>,
    fail_writes: AtomicBool,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing merge rules.
    pub async fn insert(&self, subscription: Subscription) {
        self.records
            .write()
            .await
            .insert(subscription.user_id.clone(), subscription);
    }

    /// Make every subsequent merge fail as if the database were down.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn merge(
        &self,
        user_id: &UserId,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<MergeOutcome, BillingError> {
        let mut records = self.records.write().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BillingError::infrastructure("subscription store unavailable"));
        }

        let outcome = MergeOutcome::resolve(user_id, records.get(user_id).cloned(), change, now)?;
        if let MergeOutcome::Applied { current, .. } = &outcome {
            records.insert(user_id.clone(), current.clone());
        }
        Ok(outcome)
    }

    async fn find_expired_cancellations(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let records = self.records.read().await;
        let mut expired: Vec<Subscription> = records
            .values()
            .filter(|s| s.is_active && !s.is_active_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.end_date);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}
