//! Helpers shared by the subscriber-facing handlers.

use crate::domain::billing::{BillingError, LifecycleState, Subscription};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{MergeOutcome, SubscriptionRepository};

/// Loads the user's record and checks it is in `expected` at `now`.
///
/// The merge re-checks atomically; this only keeps invalid requests away
/// from the gateway.
pub(crate) async fn load_in_state(
    repository: &dyn SubscriptionRepository,
    user_id: &UserId,
    expected: LifecycleState,
    action: &str,
    now: Timestamp,
) -> Result<Subscription, BillingError> {
    let current = repository
        .find_by_user_id(user_id)
        .await?
        .ok_or_else(|| BillingError::not_found_for_user(user_id.clone()))?;
    let state = current.lifecycle(now);
    if state != expected {
        return Err(BillingError::invalid_state(state.label(), action));
    }
    Ok(current)
}

/// The record after a subscriber-initiated merge.
pub(crate) fn committed(outcome: MergeOutcome, user_id: &UserId) -> Result<Subscription, BillingError> {
    match outcome {
        MergeOutcome::Applied { current, .. } => Ok(current),
        MergeOutcome::Skipped {
            current: Some(current),
            ..
        } => Ok(current),
        MergeOutcome::Skipped { current: None, .. } => {
            Err(BillingError::not_found_for_user(user_id.clone()))
        }
    }
}
