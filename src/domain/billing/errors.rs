//! Billing-specific error types.
//!
//! Errors raised by subscriber-facing billing operations.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFoundForUser | 404 |
//! | AlreadySubscribed | 409 |
//! | InvalidPlan | 400 |
//! | RefundNotAllowed | 400 |
//! | InvalidState | 409 |
//! | ValidationFailed | 400 |
//! | Gateway | 502 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, UserId, ValidationError};

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// No subscription exists for this user.
    NotFoundForUser(UserId),

    /// User already holds a live subscription.
    AlreadySubscribed(UserId),

    /// Plan name outside the supported catalog.
    InvalidPlan(String),

    /// Refund request rejected, with a human-readable reason.
    RefundNotAllowed { reason: String },

    /// Operation not legal in the current lifecycle state.
    InvalidState { current: String, attempted: String },

    /// Validation failed.
    ValidationFailed { field: String, message: String },

    /// The payment gateway rejected or failed the call.
    Gateway(String),

    /// Infrastructure error.
    Infrastructure(String),
}

impl BillingError {
    pub fn not_found_for_user(user_id: UserId) -> Self {
        BillingError::NotFoundForUser(user_id)
    }

    pub fn already_subscribed(user_id: UserId) -> Self {
        BillingError::AlreadySubscribed(user_id)
    }

    pub fn invalid_plan(plan: impl Into<String>) -> Self {
        BillingError::InvalidPlan(plan.into())
    }

    pub fn refund_not_allowed(reason: impl Into<String>) -> Self {
        BillingError::RefundNotAllowed {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        BillingError::Gateway(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::NotFoundForUser(_) => ErrorCode::SubscriptionNotFound,
            BillingError::AlreadySubscribed(_) => ErrorCode::SubscriptionExists,
            BillingError::InvalidPlan(_) => ErrorCode::InvalidPlan,
            BillingError::RefundNotAllowed { .. } => ErrorCode::RefundNotAllowed,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::Gateway(_) => ErrorCode::GatewayError,
            BillingError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Returns a user-facing message. Infrastructure details are not exposed.
    pub fn message(&self) -> String {
        match self {
            BillingError::NotFoundForUser(user_id) => {
                format!("No subscription found for user: {}", user_id)
            }
            BillingError::AlreadySubscribed(user_id) => {
                format!("User {} already has a subscription", user_id)
            }
            BillingError::InvalidPlan(plan) => format!("Unsupported plan: {}", plan),
            BillingError::RefundNotAllowed { reason } => reason.clone(),
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} a subscription that is {}", attempted, current)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Gateway(_) => "Payment provider request failed".to_string(),
            BillingError::Infrastructure(_) => "Internal error".to_string(),
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingError::Gateway(detail) => write!(f, "gateway error: {}", detail),
            BillingError::Infrastructure(detail) => write!(f, "infrastructure error: {}", detail),
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::GatewayError => BillingError::Gateway(err.to_string()),
            ErrorCode::ValidationFailed => BillingError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        BillingError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
