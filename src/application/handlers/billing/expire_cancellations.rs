//! ExpireCancellationsHandler - revokes access once a scheduled cancellation
//! reaches its end date.
//!
//! The gateway also reports the final deletion, but that notification can be
//! late or lost; the sweep makes revocation independent of it. Both paths go
//! through the same merge, so whichever lands second is a no-op.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionChange};
use crate::domain::foundation::Timestamp;
use crate::ports::SubscriptionRepository;

use super::entitlement_sync::EntitlementSync;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub failed: usize,
}

pub struct ExpireCancellationsHandler {
    repository: Arc<dyn SubscriptionRepository>,
    entitlements: Arc<EntitlementSync>,
    batch_size: u32,
}

impl ExpireCancellationsHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        entitlements: Arc<EntitlementSync>,
        batch_size: u32,
    ) -> Self {
        Self {
            repository,
            entitlements,
            batch_size,
        }
    }

    /// Expire one batch of lapsed cancellations.
    ///
    /// A failure on one record is logged and counted; the rest of the batch
    /// still runs.
    pub async fn handle(&self, now: Timestamp) -> Result<SweepReport, BillingError> {
        let due = self
            .repository
            .find_expired_cancellations(now, self.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for subscription in due {
            let user_id = subscription.user_id;
            let outcome = match self
                .repository
                .merge(&user_id, &SubscriptionChange::ExpireCancellation, now)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to expire cancellation");
                    report.failed += 1;
                    continue;
                }
            };
            if !outcome.is_applied() {
                continue;
            }
            report.expired += 1;
            if let Err(e) = self.entitlements.sync(&user_id, &outcome).await {
                tracing::error!(
                    alert = true,
                    user_id = %user_id,
                    error = %e,
                    "Expired subscription but could not revoke entitlement"
                );
                report.failed += 1;
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                expired = report.expired,
                failed = report.failed,
                "Cancellation sweep finished"
            );
        }
        Ok(report)
    }
}
