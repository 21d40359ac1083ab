//! ChangePlanHandler - mid-period plan swap with proration.
//!
//! The quote is computed before the gateway call and reported back so the
//! client can show what was charged or credited. `start_date` is kept; the
//! period restarts from now on the new plan's cadence.

use std::sync::Arc;

use crate::domain::billing::{
    quote_plan_change, BillingError, LifecycleState, Plan, ProrationQuote, Subscription,
    SubscriptionChange,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{PaymentGateway, SubscriptionRepository};

use super::common::{committed, load_in_state};
use super::entitlement_sync::EntitlementSync;

#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub user_id: UserId,
    /// Plan name as submitted by the client.
    pub new_plan: String,
}

#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    pub subscription: Subscription,
    pub quote: ProrationQuote,
}

pub struct ChangePlanHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementSync>,
}

impl ChangePlanHandler {
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

    pub async fn handle(&self, cmd: ChangePlanCommand) -> Result<ChangePlanResult, BillingError> {
        let new_plan = Plan::parse(&cmd.new_plan)?;
        let now = Timestamp::now();

        let current = load_in_state(
            self.repository.as_ref(),
            &cmd.user_id,
            LifecycleState::Active,
            "change plan",
            now,
        )
        .await?;
        if current.plan == new_plan {
            return Err(BillingError::validation(
                "newPlan",
                format!("already on the {} plan", new_plan),
            ));
        }

        let quote = quote_plan_change(
            current.plan,
            new_plan,
            current.start_date,
            current.end_date,
            now,
        );

        if let Some(subscription_id) = current.external_subscription_id.as_deref() {
            self.gateway.change_plan(subscription_id, new_plan).await?;
        }

        let outcome = self
            .repository
            .merge(
                &cmd.user_id,
                &SubscriptionChange::PlanChanged {
                    plan: new_plan,
                    end_date: quote.new_end_date,
                },
                now,
            )
            .await?;
        self.entitlements.sync_or_alert(&cmd.user_id, &outcome).await;

        let subscription = committed(outcome, &cmd.user_id)?;
        tracing::info!(
            user_id = %cmd.user_id,
            old_plan = quote.old_plan.as_str(),
            new_plan = quote.new_plan.as_str(),
            proration_amount = quote.proration_amount,
            "Plan changed"
        );
        Ok(ChangePlanResult {
            subscription,
            quote,
        })
    }
}
