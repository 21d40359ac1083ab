//! Mock payment gateway for testing.
//!
//! Provides a configurable implementation of `PaymentGateway` for unit
//! and integration tests. Supports:
//! - Pre-configured subscriptions
//! - Error injection per method
//! - Call tracking
//! - Artificial latency
//!
//! Unknown subscription ids are treated as active subscriptions so tests
//! only need to seed the gateway when the gateway's view matters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::billing::{Plan, ProviderStatus};
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewaySubscription, PaymentError, PaymentGateway,
    RefundReceipt, RefundRequest,
};

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.set_method_error("refund", PaymentError::provider("declined"));
///
/// let result = gateway.refund(&request).await;
/// assert!(result.is_err());
/// assert_eq!(gateway.call_count("refund"), 1);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, GatewaySubscription>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<MethodCall>,
    latency: Option<Duration>,
    sequence: u32,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the gateway's view.
    pub fn add_subscription(&self, subscription: GatewaySubscription) {
        let id = subscription.id.clone();
        self.state().subscriptions.insert(id, subscription);
    }

    /// Fail every call to `method` with `error` until cleared.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn subscription(&self, id: &str) -> Option<GatewaySubscription> {
        self.state().subscriptions.get(id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        let latency = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            if let Some(error) = state.method_errors.get(method) {
                return Err(error.clone());
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.sequence += 1;
        format!("{}_mock_{}", prefix, state.sequence)
    }

    fn update_subscription<F>(&self, id: &str, update: F) -> GatewaySubscription
    where
        F: FnOnce(&mut GatewaySubscription),
    {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .entry(id.to_string())
            .or_insert_with(|| active_subscription(id));
        update(subscription);
        subscription.clone()
    }
}

fn active_subscription(id: &str) -> GatewaySubscription {
    GatewaySubscription {
        id: id.to_string(),
        customer_id: None,
        status: ProviderStatus::Active,
        cancel_at_period_end: false,
        current_period_start: None,
        current_period_end: None,
        price_id: None,
    }
}

/// Price id the mock reports for `plan`.
pub fn mock_price_id(plan: Plan) -> String {
    format!("price_{}", plan.as_str())
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, PaymentError> {
        self.enter("retrieve_subscription", vec![subscription_id.to_string()])
            .await?;
        Ok(self
            .state()
            .subscriptions
            .get(subscription_id)
            .cloned()
            .unwrap_or_else(|| active_subscription(subscription_id)))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.enter(
            "create_checkout_session",
            vec![request.user_id.to_string(), request.plan.to_string()],
        )
        .await?;
        let id = self.next_id("cs");
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{}", id),
            id,
            expires_at: None,
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, PaymentError> {
        self.enter(
            "set_cancel_at_period_end",
            vec![subscription_id.to_string(), cancel.to_string()],
        )
        .await?;
        Ok(self.update_subscription(subscription_id, |s| s.cancel_at_period_end = cancel))
    }

    async fn cancel_immediately(&self, subscription_id: &str) -> Result<(), PaymentError> {
        self.enter("cancel_immediately", vec![subscription_id.to_string()])
            .await?;
        self.update_subscription(subscription_id, |s| s.status = ProviderStatus::Canceled);
        Ok(())
    }

    async fn change_plan(
        &self,
        subscription_id: &str,
        plan: Plan,
    ) -> Result<GatewaySubscription, PaymentError> {
        self.enter(
            "change_plan",
            vec![subscription_id.to_string(), plan.to_string()],
        )
        .await?;
        Ok(self.update_subscription(subscription_id, |s| s.price_id = Some(mock_price_id(plan))))
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, PaymentError> {
        self.enter(
            "refund",
            vec![
                request.payment_reference.clone(),
                request.amount.to_string(),
                request.idempotency_key.clone(),
            ],
        )
        .await?;
        Ok(RefundReceipt {
            id: self.next_id("re"),
            amount: request.amount,
            status: "succeeded".to_string(),
        })
    }
}
