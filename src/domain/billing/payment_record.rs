//! Immutable billing ledger entries.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentRecordId, Timestamp, UserId};

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// One ledger entry. `transaction_id` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: PaymentRecordId,
    pub subscription_ref: Option<String>,
    pub user_id: UserId,
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub transaction_id: String,
    pub invoice_id: Option<String>,
    pub status: PaymentStatus,
    pub is_renewal: bool,
    pub failure_reason: Option<String>,
    pub timestamp: Timestamp,
}

impl PaymentRecord {
    /// Dedup key for a successful payment of `invoice_id`.
    pub fn success_key(invoice_id: &str) -> String {
        invoice_id.to_string()
    }

    /// Dedup key for the `attempt`-th failed attempt on `invoice_id`.
    pub fn failure_key(invoice_id: &str, attempt: u32) -> String {
        format!("{}:attempt-{}", invoice_id, attempt)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn success(
        user_id: UserId,
        subscription_ref: Option<String>,
        transaction_id: impl Into<String>,
        invoice_id: Option<String>,
        amount: i64,
        currency: impl Into<String>,
        is_renewal: bool,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: PaymentRecordId::new(),
            subscription_ref,
            user_id,
            amount,
            currency: currency.into(),
            transaction_id: transaction_id.into(),
            invoice_id,
            status: PaymentStatus::Success,
            is_renewal,
            failure_reason: None,
            timestamp,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failure(
        user_id: UserId,
        subscription_ref: Option<String>,
        transaction_id: impl Into<String>,
        invoice_id: Option<String>,
        amount: i64,
        currency: impl Into<String>,
        failure_reason: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: PaymentRecordId::new(),
            subscription_ref,
            user_id,
            amount,
            currency: currency.into(),
            transaction_id: transaction_id.into(),
            invoice_id,
            status: PaymentStatus::Failed,
            is_renewal: false,
            failure_reason: Some(failure_reason.into()),
            timestamp,
        }
    }
}
