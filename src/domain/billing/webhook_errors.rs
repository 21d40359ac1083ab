//! Webhook error types for gateway notification handling.
//!
//! Only verification failures produce a non-2xx response. Everything that
//! goes wrong after the signature checks out is acknowledged so the sender
//! does not enter a retry storm; persistence and collaborator failures are
//! additionally dead-lettered for replay.

use http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    /// No signature header was sent.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the signature header or the event envelope.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Checkout metadata carried no user id.
    #[error("Missing metadata: user_id")]
    MissingUserId,

    /// Checkout metadata carried no plan.
    #[error("Missing metadata: plan")]
    MissingPlan,

    /// Checkout metadata named a plan outside the catalog.
    #[error("Unsupported plan in metadata: {0}")]
    InvalidPlan(String),

    /// Required field missing from the event object.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// No user is mapped to the gateway customer.
    #[error("No user mapped to customer {0}")]
    UnresolvedCustomer(String),

    /// Storage failed while applying the event.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The gateway or user directory failed while applying the event.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// Processing did not finish inside the response budget.
    #[error("Processing exceeded {0} ms budget")]
    BudgetExceeded(u64),
}

impl WebhookError {
    /// True for failures detected before the payload was trusted.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
                | WebhookError::ParseError(_)
        )
    }

    /// True when the event should be kept for manual replay.
    pub fn should_dead_letter(&self) -> bool {
        matches!(
            self,
            WebhookError::Persistence(_)
                | WebhookError::Collaborator(_)
                | WebhookError::BudgetExceeded(_)
        )
    }

    /// Taxonomy label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => "signature_error",
            WebhookError::ParseError(_) => "malformed_payload",
            WebhookError::MissingUserId
            | WebhookError::MissingPlan
            | WebhookError::InvalidPlan(_)
            | WebhookError::MissingField(_) => "missing_required_field",
            WebhookError::UnresolvedCustomer(_) => "unresolved_customer",
            WebhookError::Persistence(_) | WebhookError::BudgetExceeded(_) => {
                "persistence_failure"
            }
            WebhookError::Collaborator(_) => "collaborator_failure",
        }
    }

    /// Maps the error to the HTTP status returned to the sender.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MissingSignature
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}
