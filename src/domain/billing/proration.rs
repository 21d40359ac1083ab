//! Proration for mid-cycle plan changes.
//!
//! The charge (or credit, when negative) is the price difference between
//! the plans scaled by the unused share of the current period.

use serde::Serialize;

use super::plan::Plan;
use crate::domain::foundation::Timestamp;

/// Result of pricing a plan change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProrationQuote {
    pub old_plan: Plan,
    pub new_plan: Plan,
    /// Cents; positive is a charge, negative a credit.
    pub proration_amount: i64,
    pub days_remaining: i64,
    /// Period end after the swap, measured from `now` on the new cadence.
    pub new_end_date: Timestamp,
}

/// Prices a swap from `old_plan` to `new_plan` at `now` within the period
/// `[period_start, period_end)`.
pub fn quote_plan_change(
    old_plan: Plan,
    new_plan: Plan,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
) -> ProrationQuote {
    let period = period_end
        .duration_since(&period_start)
        .num_seconds()
        .max(1);
    let remaining = period_end
        .duration_since(&now)
        .num_seconds()
        .clamp(0, period);

    let delta = new_plan.price_cents() - old_plan.price_cents();
    let proration_amount = scale(delta, remaining, period);

    ProrationQuote {
        old_plan,
        new_plan,
        proration_amount,
        days_remaining: remaining / 86_400,
        new_end_date: new_plan.cadence().period_end(now),
    }
}

/// `amount * numerator / denominator`, truncated toward zero.
pub(crate) fn scale(amount: i64, numerator: i64, denominator: i64) -> i64 {
    if denominator <= 0 {
        return 0;
    }
    let scaled = i128::from(amount) * i128::from(numerator) / i128::from(denominator);
    // |scaled| <= |amount| whenever numerator <= denominator
    i64::try_from(scaled).unwrap_or(amount)
}
