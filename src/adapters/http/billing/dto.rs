//! HTTP DTOs for the billing endpoints.
//!
//! Request and response bodies are camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::application::{
    CancelSubscriptionResult, ChangePlanResult, ReplayReport, RequestRefundResult,
    SubscriptionView,
};
use crate::domain::billing::{
    CancelationType, EntitlementLevel, LifecycleState, PaymentRecord, Subscription,
};
use crate::domain::foundation::Timestamp;
use crate::ports::CheckoutSession;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanRequest {
    pub new_plan: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query string for the dead-letter replay endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayParams {
    #[serde(default = "default_replay_limit")]
    pub limit: u32,
}

fn default_replay_limit() -> u32 {
    100
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Stored subscription plus the values derived at read time.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub lifecycle: LifecycleState,
    pub entitlement: EntitlementLevel,
}

impl From<SubscriptionView> for SubscriptionResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            subscription: view.subscription,
            lifecycle: view.lifecycle,
            entitlement: view.entitlement,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            url: session.url,
            session_id: session.id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelation_type: CancelationType,
    pub end_date: Timestamp,
}

impl From<CancelSubscriptionResult> for CancelResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            cancelation_type: result.subscription.cancelation_type,
            end_date: result.effective_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanResponse {
    pub subscription: Subscription,
    /// Cents; negative on downgrade.
    pub proration_amount: i64,
    pub days_remaining: i64,
}

impl From<ChangePlanResult> for ChangePlanResponse {
    fn from(result: ChangePlanResult) -> Self {
        Self {
            subscription: result.subscription,
            proration_amount: result.quote.proration_amount,
            days_remaining: result.quote.days_remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub refund_id: String,
    /// Cents.
    pub amount: i64,
    pub currency: &'static str,
    pub subscription: Subscription,
}

impl From<RequestRefundResult> for RefundResponse {
    fn from(result: RequestRefundResult) -> Self {
        Self {
            refund_id: result.refund_id,
            amount: result.amount,
            currency: result.subscription.plan.currency(),
            subscription: result.subscription,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentsResponse {
    pub payments: Vec<PaymentRecord>,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
}

impl WebhookAck {
    pub fn received(ignored: bool) -> Self {
        Self {
            received: true,
            ignored: ignored.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayResponse {
    pub replayed: usize,
    pub failed: usize,
}

impl From<ReplayReport> for ReplayResponse {
    fn from(report: ReplayReport) -> Self {
        Self {
            replayed: report.replayed,
            failed: report.failed,
        }
    }
}
