//! EntitlementSync - pushes access-level changes to the user directory.
//!
//! The directory is told about a user only when a merge flips `is_active`.
//! Skipped merges and merges that leave `is_active` alone produce no call.

use std::sync::Arc;

use crate::domain::billing::{EntitlementChange, EntitlementLevel, Subscription};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{MergeOutcome, UserDirectory};

pub struct EntitlementSync {
    directory: Arc<dyn UserDirectory>,
}

impl EntitlementSync {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Push the entitlement owed by `outcome`, if any.
    pub async fn sync(
        &self,
        user_id: &UserId,
        outcome: &MergeOutcome,
    ) -> Result<EntitlementChange, DomainError> {
        let change = outcome.entitlement_change();
        if let Some(level) = change.level() {
            self.directory.set_entitlement(user_id, level).await?;
            tracing::info!(
                user_id = %user_id,
                level = level.as_str(),
                "Entitlement updated"
            );
        }
        Ok(change)
    }

    /// Like [`sync`](Self::sync) for subscriber-initiated changes, where the
    /// record is already committed: a directory failure is alerted, not returned.
    pub async fn sync_or_alert(&self, user_id: &UserId, outcome: &MergeOutcome) {
        if let Err(e) = self.sync(user_id, outcome).await {
            tracing::error!(
                alert = true,
                user_id = %user_id,
                error = %e,
                "Entitlement push failed after committed change"
            );
        }
    }

    /// Push the level implied by `subscription` unconditionally.
    ///
    /// Returns `None` when there is no record to derive a level from.
    pub async fn resync(
        &self,
        user_id: &UserId,
        subscription: Option<&Subscription>,
    ) -> Result<Option<EntitlementLevel>, DomainError> {
        let Some(subscription) = subscription else {
            return Ok(None);
        };
        let level = EntitlementLevel::from_active(subscription.is_active);
        self.directory.set_entitlement(user_id, level).await?;
        tracing::info!(
            user_id = %user_id,
            level = level.as_str(),
            "Entitlement resynced"
        );
        Ok(Some(level))
    }
}
