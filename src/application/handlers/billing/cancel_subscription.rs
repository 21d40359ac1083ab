//! CancelSubscriptionHandler - Command handler for end-of-period cancellation.
//!
//! The user keeps access until `end_date`; the expiry sweep revokes it after.

use std::sync::Arc;

use crate::domain::billing::{BillingError, LifecycleState, Subscription, SubscriptionChange};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{PaymentGateway, SubscriptionRepository};

use super::common::{committed, load_in_state};
use super::entitlement_sync::EntitlementSync;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    /// When access ends.
    pub effective_at: Timestamp,
}

pub struct CancelSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementSync>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        entitlements: Arc<EntitlementSync>,
    ) -> Self {
        Self {
            repository,
            gateway,
            entitlements,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let now = Timestamp::now();

        // 1. Reject early so the gateway is not touched for an invalid request
        let current = load_in_state(
            self.repository.as_ref(),
            &cmd.user_id,
            LifecycleState::Active,
            "cancel",
            now,
        )
        .await?;

        // 2. Gateway first, so a local cancel is never left without a remote one
        if let Some(subscription_id) = current.external_subscription_id.as_deref() {
            self.gateway
                .set_cancel_at_period_end(subscription_id, true)
                .await?;
        }

        // 3. Atomic local merge (re-checks the state)
        let outcome = self
            .repository
            .merge(&cmd.user_id, &SubscriptionChange::ScheduleCancel, now)
            .await?;
        self.entitlements.sync_or_alert(&cmd.user_id, &outcome).await;

        let subscription = committed(outcome, &cmd.user_id)?;
        tracing::info!(
            user_id = %cmd.user_id,
            end_date = %subscription.end_date,
            "Subscription scheduled for cancellation"
        );
        Ok(CancelSubscriptionResult {
            effective_at: subscription.end_date,
            subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryUserDirectory};
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::billing::test_support::{active_subscription, user};
    use crate::domain::billing::{CancelationType, SubscriptionStatus};
    use crate::ports::PaymentError;

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        directory: Arc<InMemoryUserDirectory>,
        gateway: MockPaymentGateway,
        handler: CancelSubscriptionHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let gateway = MockPaymentGateway::new();
        let handler = CancelSubscriptionHandler::new(
            repo.clone(),
            Arc::new(gateway.clone()),
            Arc::new(EntitlementSync::new(directory.clone())),
        );
        Fixture {
            repo,
            directory,
            gateway,
            handler,
        }
    }

    #[tokio::test]
    async fn mid_period_cancel_keeps_access_and_end_date() {
        let f = fixture();
        let started = Timestamp::now().minus_days(10);
        let sub = active_subscription(started);
        let end_date = sub.end_date;
        f.repo.insert(sub).await;

        let result = f
            .handler
            .handle(CancelSubscriptionCommand { user_id: user() })
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Canceled);
        assert_eq!(result.subscription.cancelation_type, CancelationType::EndOfPeriod);
        assert!(result.subscription.is_active);
        assert_eq!(result.effective_at, end_date);
        assert!(f.gateway.subscription("sub_1").unwrap().cancel_at_period_end);
        assert!(f.directory.pushes().await.is_empty());
    }

    #[tokio::test]
    async fn second_cancel_is_invalid_state() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now())).await;
        f.handler
            .handle(CancelSubscriptionCommand { user_id: user() })
            .await
            .unwrap();

        let err = f
            .handler
            .handle(CancelSubscriptionCommand { user_id: user() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidState { .. }));
        assert_eq!(f.gateway.call_count("set_cancel_at_period_end"), 1);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_record_untouched() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now())).await;
        f.gateway
            .set_method_error("set_cancel_at_period_end", PaymentError::network("down"));

        let err = f
            .handler
            .handle(CancelSubscriptionCommand { user_id: user() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
        let stored = f.repo.find_by_user_id(&user()).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn no_subscription_is_not_found() {
        let f = fixture();
        let err = f
            .handler
            .handle(CancelSubscriptionCommand { user_id: user() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFoundForUser(_)));
    }
}
