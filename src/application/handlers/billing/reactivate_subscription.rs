//! ReactivateSubscriptionHandler - undoes a pending end-of-period cancellation.

use std::sync::Arc;

use crate::domain::billing::{BillingError, LifecycleState, Subscription, SubscriptionChange};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{PaymentGateway, SubscriptionRepository};

use super::common::{committed, load_in_state};
use super::entitlement_sync::EntitlementSync;

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub user_id: UserId,
}

pub struct ReactivateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementSync>,
}

impl ReactivateSubscriptionHandler {
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
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<Subscription, BillingError> {
        let now = Timestamp::now();

        let current = load_in_state(
            self.repository.as_ref(),
            &cmd.user_id,
            LifecycleState::CancelPending,
            "reactivate",
            now,
        )
        .await?;

        if let Some(subscription_id) = current.external_subscription_id.as_deref() {
            self.gateway
                .set_cancel_at_period_end(subscription_id, false)
                .await?;
        }

        let outcome = self
            .repository
            .merge(&cmd.user_id, &SubscriptionChange::Reactivate, now)
            .await?;
        self.entitlements.sync_or_alert(&cmd.user_id, &outcome).await;

        let subscription = committed(outcome, &cmd.user_id)?;
        tracing::info!(user_id = %cmd.user_id, "Subscription reactivated");
        Ok(subscription)
    }
}
