//! Refund handlers.
//!
//! `RequestRefundHandler` runs in two phases so that a slow or failing
//! gateway never leaves a half-refunded record behind:
//!
//! 1. `RefundRequested` re-evaluates eligibility inside the atomic merge and
//!    claims the refund (a concurrent second request is rejected there).
//! 2. The gateway refund and immediate cancellation run, then either
//!    `RefundProcessed` commits the result or `RefundFailed` releases the claim.

use std::sync::Arc;

use crate::domain::billing::{
    prorated_refund_amount, BillingError, RefundEligibility, Subscription, SubscriptionChange,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{PaymentGateway, RefundRequest, SubscriptionRepository};

use super::common::committed;
use super::entitlement_sync::EntitlementSync;

const DEFAULT_REASON: &str = "requested_by_customer";

// ════════════════════════════════════════════════════════════════════════════════
// Eligibility
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct GetRefundEligibilityQuery {
    pub user_id: UserId,
}

pub struct GetRefundEligibilityHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl GetRefundEligibilityHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        query: GetRefundEligibilityQuery,
    ) -> Result<RefundEligibility, BillingError> {
        let subscription = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| BillingError::not_found_for_user(query.user_id.clone()))?;
        Ok(subscription.refund_eligibility(Timestamp::now()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Request
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RequestRefundCommand {
    pub user_id: UserId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestRefundResult {
    pub subscription: Subscription,
    pub refund_id: String,
    /// Cents.
    pub amount: i64,
}

pub struct RequestRefundHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementSync>,
}

impl RequestRefundHandler {
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
        cmd: RequestRefundCommand,
    ) -> Result<RequestRefundResult, BillingError> {
        let now = Timestamp::now();
        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON)
            .to_string();

        // 1. Claim
        let claimed = self
            .repository
            .merge(&cmd.user_id, &SubscriptionChange::RefundRequested, now)
            .await?;
        let subscription = committed(claimed, &cmd.user_id)?;

        let Some(payment_reference) = subscription.last_transaction_id.clone() else {
            self.release(&cmd.user_id, now).await;
            return Err(BillingError::refund_not_allowed("no payment to refund"));
        };
        let amount = prorated_refund_amount(
            subscription.plan,
            subscription.start_date,
            subscription.end_date,
            now,
        );

        // 2. Gateway
        let receipt = match self
            .gateway
            .refund(&RefundRequest {
                idempotency_key: refund_idempotency_key(&payment_reference),
                payment_reference,
                amount,
                reason: reason.clone(),
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(user_id = %cmd.user_id, error = %e, "Gateway refund failed");
                self.release(&cmd.user_id, now).await;
                return Err(e.into());
            }
        };

        if let Some(subscription_id) = subscription.external_subscription_id.as_deref() {
            if let Err(e) = self.gateway.cancel_immediately(subscription_id).await {
                tracing::error!(
                    alert = true,
                    user_id = %cmd.user_id,
                    subscription_id = subscription_id,
                    refund_id = %receipt.id,
                    error = %e,
                    "Refund issued but provider subscription still open"
                );
            }
        }

        // 3. Commit
        let outcome = self
            .repository
            .merge(
                &cmd.user_id,
                &SubscriptionChange::RefundProcessed {
                    amount: receipt.amount,
                    reason,
                },
                now,
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    alert = true,
                    user_id = %cmd.user_id,
                    refund_id = %receipt.id,
                    error = %e,
                    "Refund issued but could not be recorded"
                );
                e
            })?;
        self.entitlements.sync_or_alert(&cmd.user_id, &outcome).await;

        let subscription = committed(outcome, &cmd.user_id)?;
        tracing::info!(
            user_id = %cmd.user_id,
            refund_id = %receipt.id,
            amount = receipt.amount,
            "Refund processed"
        );
        Ok(RequestRefundResult {
            subscription,
            refund_id: receipt.id,
            amount: receipt.amount,
        })
    }

    async fn release(&self, user_id: &UserId, now: Timestamp) {
        if let Err(e) = self
            .repository
            .merge(user_id, &SubscriptionChange::RefundFailed, now)
            .await
        {
            tracing::error!(
                alert = true,
                user_id = %user_id,
                error = %e,
                "Could not release refund claim"
            );
        }
    }
}

/// One refund per payment. The record id survives re-subscription, so it
/// cannot key the gateway call.
fn refund_idempotency_key(payment_reference: &str) -> String {
    format!("refund-{}", payment_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryUserDirectory};
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::billing::test_support::{active_subscription, user};
    use crate::domain::billing::{
        CancelationType, CheckoutActivation, EntitlementLevel, EventStamp, Plan, RefundStatus,
        SubscriptionStatus,
    };
    use crate::domain::foundation::CustomerId;
    use crate::ports::PaymentError;

    struct Fixture {
        repo: Arc<InMemorySubscriptionRepository>,
        directory: Arc<InMemoryUserDirectory>,
        gateway: MockPaymentGateway,
        handler: RequestRefundHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let gateway = MockPaymentGateway::new();
        let handler = RequestRefundHandler::new(
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

    fn command() -> RequestRefundCommand {
        RequestRefundCommand {
            user_id: user(),
            reason: Some("changed my mind".into()),
        }
    }

    #[tokio::test]
    async fn eligibility_inside_window() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        repo.insert(active_subscription(Timestamp::now().minus_days(2))).await;

        let eligibility = GetRefundEligibilityHandler::new(repo)
            .handle(GetRefundEligibilityQuery { user_id: user() })
            .await
            .unwrap();
        assert!(eligibility.eligible);
        assert_eq!(eligibility.days_since_start, 2);
        assert_eq!(eligibility.days_remaining_for_refund, 5);
    }

    #[tokio::test]
    async fn eligibility_without_subscription_is_not_found() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let err = GetRefundEligibilityHandler::new(repo)
            .handle(GetRefundEligibilityQuery { user_id: user() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFoundForUser(_)));
    }

    #[tokio::test]
    async fn refund_inside_window_cancels_and_revokes() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now().minus_days(2))).await;

        let result = f.handler.handle(command()).await.unwrap();

        assert!(result.amount > 0);
        assert!(result.amount < Plan::Monthly.price_cents());
        let sub = &result.subscription;
        assert_eq!(sub.refund_status, RefundStatus::Processed);
        assert_eq!(sub.refund_amount, Some(result.amount));
        assert_eq!(sub.refund_reason.as_deref(), Some("changed my mind"));
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(sub.cancelation_type, CancelationType::Immediate);
        assert!(!sub.is_active);
        assert!(f.gateway.was_called("cancel_immediately"));
        assert_eq!(f.directory.pushes().await, vec![(user(), EntitlementLevel::Free)]);
    }

    #[tokio::test]
    async fn refund_outside_window_is_rejected_with_reason() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now().minus_days(10))).await;

        let err = f.handler.handle(command()).await.unwrap_err();
        assert_eq!(err, BillingError::refund_not_allowed("refund period expired"));
        assert!(!f.gateway.was_called("refund"));
    }

    #[tokio::test]
    async fn second_refund_is_rejected() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now().minus_days(1))).await;
        f.handler.handle(command()).await.unwrap();

        let err = f.handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, BillingError::RefundNotAllowed { .. }));
        assert_eq!(f.gateway.call_count("refund"), 1);
    }

    #[tokio::test]
    async fn gateway_failure_releases_claim() {
        let f = fixture();
        f.repo.insert(active_subscription(Timestamp::now().minus_days(1))).await;
        f.gateway.set_method_error("refund", PaymentError::network("down"));

        let err = f.handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));

        let stored = f.repo.find_by_user_id(&user()).await.unwrap().unwrap();
        assert_eq!(stored.refund_status, RefundStatus::None);
        assert!(stored.is_active);
        assert!(f.directory.pushes().await.is_empty());
    }

    #[tokio::test]
    async fn missing_payment_reference_releases_claim() {
        let f = fixture();
        let mut sub = active_subscription(Timestamp::now());
        sub.last_transaction_id = None;
        f.repo.insert(sub).await;

        let err = f.handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, BillingError::RefundNotAllowed { .. }));
        let stored = f.repo.find_by_user_id(&user()).await.unwrap().unwrap();
        assert_eq!(stored.refund_status, RefundStatus::None);
    }

    #[tokio::test]
    async fn refund_after_resubscribing_uses_a_fresh_gateway_key() {
        let f = fixture();
        let started = Timestamp::now().minus_days(1);
        f.repo.insert(active_subscription(started)).await;
        let first = f.handler.handle(command()).await.unwrap();
        let original_id = first.subscription.id;

        let resubscribe = SubscriptionChange::Checkout(CheckoutActivation {
            customer_id: CustomerId::new("cus_1").unwrap(),
            subscription_id: Some("sub_2".into()),
            plan: Plan::Monthly,
            payment_method: Some("card".into()),
            transaction_id: Some("in_2".into()),
            event: EventStamp::new("evt_checkout_2", Timestamp::now()),
        });
        f.repo.merge(&user(), &resubscribe, Timestamp::now()).await.unwrap();

        let second = f.handler.handle(command()).await.unwrap();
        assert_eq!(second.subscription.id, original_id);

        let keys: Vec<String> = f
            .gateway
            .calls()
            .into_iter()
            .filter(|c| c.method == "refund")
            .map(|c| c.args[2].clone())
            .collect();
        assert_eq!(keys, vec!["refund-in_1".to_string(), "refund-in_2".to_string()]);
    }
}
