//! Payment gateway port.
//!
//! Outbound calls to the payment processor: hosted checkout, subscription
//! cancellation and plan swaps, and refunds. Inbound notification
//! verification lives in the domain (`WebhookVerifier`) since it is pure
//! computation over the shared secret.
//!
//! # Design
//!
//! - **Gateway agnostic**: Identifiers are opaque strings
//! - **Bounded**: Implementations apply a request timeout
//! - **Idempotent**: Mutating calls carry an idempotency key where the gateway supports one

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, Plan, ProviderStatus};
use crate::domain::foundation::{CustomerId, Timestamp, UserId};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch the gateway's current view of a subscription.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, PaymentError>;

    /// Create a hosted checkout session. The session carries the user id
    /// and plan as metadata so the completion notification can be routed.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Toggle cancel-at-period-end on a subscription.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, PaymentError>;

    /// End a subscription now.
    async fn cancel_immediately(&self, subscription_id: &str) -> Result<(), PaymentError>;

    /// Swap the subscription's price to `plan`'s, with gateway-side proration.
    async fn change_plan(
        &self,
        subscription_id: &str,
        plan: Plan,
    ) -> Result<GatewaySubscription, PaymentError>;

    /// Refund part or all of a payment.
    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, PaymentError>;
}

/// Subscription as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: ProviderStatus,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub price_id: Option<String>,
}

/// Request to create a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub plan: Plan,
    /// Gateway customer from an earlier subscription, reused when present.
    pub customer_id: Option<CustomerId>,
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for the customer to complete checkout.
    pub url: String,

    /// When the session expires (Unix timestamp).
    pub expires_at: Option<i64>,
}

/// Refund instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    /// Invoice or payment reference recorded for the charge.
    pub payment_reference: String,
    /// Cents.
    pub amount: i64,
    pub reason: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub amount: i64,
    pub status: String,
}

/// Payment error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(
            PaymentErrorCode::NotFound,
            format!("{} not found", resource),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        BillingError::gateway(err.to_string())
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    Timeout,
    AuthenticationError,
    NotFound,
    InvalidRequest,
    RateLimitExceeded,
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
