//! Subscription repository port.
//!
//! Every write to a subscription record goes through [`SubscriptionRepository::merge`],
//! which loads the user's record, applies [`Subscription::merge`] and stores
//! the result as one atomic step per user. Concurrent webhook deliveries and
//! subscriber requests for the same user therefore serialize instead of
//! overwriting each other.
//!
//! # Example
//!
//! ```ignore
//! async fn schedule_cancel(
//!     repo: &dyn SubscriptionRepository,
//!     user_id: &UserId,
//! ) -> Result<Subscription, BillingError> {
//!     match repo.merge(user_id, &SubscriptionChange::ScheduleCancel, Timestamp::now()).await? {
//!         MergeOutcome::Applied { current, .. } => Ok(current),
//!         MergeOutcome::Skipped { .. } => Err(BillingError::not_found_for_user(user_id.clone())),
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::billing::{
    BillingError, EntitlementChange, MergeDecision, SkipReason, Subscription, SubscriptionChange,
};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Result of an atomic merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The change was written. `previous` is the record before the write.
    Applied {
        previous: Option<Subscription>,
        current: Subscription,
    },
    /// The change did not apply; the stored record is untouched.
    Skipped {
        current: Option<Subscription>,
        reason: SkipReason,
    },
}

impl MergeOutcome {
    /// Runs the merge rules against `current`.
    ///
    /// Adapters call this while holding their per-user lock and persist
    /// `current` only for [`MergeOutcome::Applied`].
    pub fn resolve(
        user_id: &UserId,
        current: Option<Subscription>,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        match Subscription::merge(user_id, current.as_ref(), change, now)? {
            MergeDecision::Write(next) => Ok(MergeOutcome::Applied {
                previous: current,
                current: *next,
            }),
            MergeDecision::Skip(reason) => Ok(MergeOutcome::Skipped { current, reason }),
        }
    }

    /// Record as stored after the merge.
    pub fn current(&self) -> Option<&Subscription> {
        match self {
            MergeOutcome::Applied { current, .. } => Some(current),
            MergeOutcome::Skipped { current, .. } => current.as_ref(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            MergeOutcome::Skipped { reason, .. } => Some(*reason),
            MergeOutcome::Applied { .. } => None,
        }
    }

    /// Entitlement push owed for this merge. Skipped merges never owe one.
    pub fn entitlement_change(&self) -> EntitlementChange {
        match self {
            MergeOutcome::Applied { previous, current } => EntitlementChange::between(
                previous.as_ref().map(|p| p.is_active),
                current.is_active,
            ),
            MergeOutcome::Skipped { .. } => EntitlementChange::Unchanged,
        }
    }
}

/// Repository port for subscription records, one per user.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find the subscription owned by `user_id`.
    ///
    /// Returns `None` if the user never subscribed.
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError>;

    /// Atomically apply `change` to the user's record.
    ///
    /// # Errors
    ///
    /// - Domain rejections from [`Subscription::merge`] (not found, invalid
    ///   state, refund not allowed, same plan)
    /// - `Infrastructure` on persistence failure; nothing is written
    async fn merge(
        &self,
        user_id: &UserId,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<MergeOutcome, BillingError>;

    /// Records canceled at period end whose end date has passed but which
    /// still carry `is_active = true`.
    async fn find_expired_cancellations(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError>;
}
