//! GetSubscriptionHandler - Query handler for the caller's subscription.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, EntitlementLevel, LifecycleState, Subscription,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

/// Stored record plus values derived at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionView {
    pub subscription: Subscription,
    pub lifecycle: LifecycleState,
    pub entitlement: EntitlementLevel,
}

impl SubscriptionView {
    pub fn at(subscription: Subscription, now: Timestamp) -> Self {
        Self {
            lifecycle: subscription.lifecycle(now),
            entitlement: EntitlementLevel::from_active(subscription.is_active),
            subscription,
        }
    }
}

pub struct GetSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<SubscriptionView, BillingError> {
        let subscription = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| BillingError::not_found_for_user(query.user_id.clone()))?;
        Ok(SubscriptionView::at(subscription, Timestamp::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::application::handlers::billing::test_support::{active_subscription, user};

    #[tokio::test]
    async fn returns_view_for_existing_subscription() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        repo.insert(active_subscription(Timestamp::now())).await;

        let view = GetSubscriptionHandler::new(repo)
            .handle(GetSubscriptionQuery { user_id: user() })
            .await
            .unwrap();
        assert_eq!(view.lifecycle, LifecycleState::Active);
        assert_eq!(view.entitlement, EntitlementLevel::Premium);
    }

    #[tokio::test]
    async fn missing_subscription_is_not_found() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let err = GetSubscriptionHandler::new(repo)
            .handle(GetSubscriptionQuery { user_id: user() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFoundForUser(_)));
    }
}
