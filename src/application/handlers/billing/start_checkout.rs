//! StartCheckoutHandler - Command handler for opening a hosted checkout.
//!
//! The subscription itself is created later, when the gateway reports the
//! completed checkout.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Plan};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{CheckoutRequest, CheckoutSession, PaymentGateway, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub user_id: UserId,
    /// Plan name as submitted by the client.
    pub plan: String,
}

pub struct StartCheckoutHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl StartCheckoutHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            repository,
            gateway,
        }
    }

    pub async fn handle(&self, cmd: StartCheckoutCommand) -> Result<CheckoutSession, BillingError> {
        let plan = Plan::parse(&cmd.plan)?;

        let existing = self.repository.find_by_user_id(&cmd.user_id).await?;
        if let Some(current) = &existing {
            if current.is_live(Timestamp::now()) {
                return Err(BillingError::already_subscribed(cmd.user_id));
            }
        }

        let session = self
            .gateway
            .create_checkout_session(&CheckoutRequest {
                user_id: cmd.user_id.clone(),
                plan,
                customer_id: existing.map(|s| s.external_customer_id),
            })
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            plan = plan.as_str(),
            session_id = %session.id,
            "Checkout session created"
        );
        Ok(session)
    }
}
