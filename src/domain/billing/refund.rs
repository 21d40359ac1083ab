//! Refund eligibility window and prorated refund amount.

use serde::Serialize;

use super::plan::Plan;
use super::proration::scale;
use super::status::{RefundStatus, SubscriptionStatus};
use crate::domain::foundation::Timestamp;

pub const REASON_ALREADY_REFUNDED: &str = "refund already processed";
pub const REASON_REFUND_IN_PROGRESS: &str = "refund already requested";
pub const REASON_NOT_ACTIVE: &str = "subscription is not active";
pub const REASON_WINDOW_EXPIRED: &str = "refund period expired";

/// Snapshot of refund eligibility at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundEligibility {
    pub eligible: bool,
    pub days_since_start: i64,
    pub days_remaining_for_refund: i64,
    pub window_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Evaluates the refund window for a subscription at `now`.
pub fn evaluate_refund(
    status: SubscriptionStatus,
    refund_status: RefundStatus,
    plan: Plan,
    start_date: Timestamp,
    now: Timestamp,
) -> RefundEligibility {
    let window_days = plan.refund_window_days();
    let days_since_start = now.whole_days_since(&start_date).max(0);
    let days_remaining_for_refund = (window_days - days_since_start).max(0);

    let reason = match refund_status {
        RefundStatus::Processed => Some(REASON_ALREADY_REFUNDED),
        RefundStatus::Requested => Some(REASON_REFUND_IN_PROGRESS),
        RefundStatus::None if status != SubscriptionStatus::Active => Some(REASON_NOT_ACTIVE),
        RefundStatus::None if days_since_start >= window_days => Some(REASON_WINDOW_EXPIRED),
        RefundStatus::None => None,
    };

    RefundEligibility {
        eligible: reason.is_none(),
        days_since_start,
        days_remaining_for_refund,
        window_days,
        reason: reason.map(str::to_string),
    }
}

/// Refund owed for the unused share of `[period_start, period_end)`, in cents.
pub fn prorated_refund_amount(
    plan: Plan,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
) -> i64 {
    let period = period_end.duration_since(&period_start).num_seconds();
    if period <= 0 {
        return 0;
    }
    let unused = period_end.duration_since(&now).num_seconds().clamp(0, period);
    scale(plan.price_cents(), unused, period)
}
