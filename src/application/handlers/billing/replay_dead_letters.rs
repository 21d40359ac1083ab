//! ReplayDeadLettersHandler - re-runs parked notifications.
//!
//! Payloads were verified when first received, so the signature is not
//! checked again. Each replay forces an entitlement resync.

use std::sync::Arc;

use crate::domain::billing::{BillingError, GatewayEvent};
use crate::domain::foundation::Timestamp;
use crate::ports::{DeadLetterEntry, DeadLetterStore};

use super::apply_billing_event::BillingEventApplier;

#[derive(Debug, Clone, Copy)]
pub struct ReplayDeadLettersCommand {
    /// Maximum entries to replay in this run.
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
}

pub struct ReplayDeadLettersHandler {
    dead_letters: Arc<dyn DeadLetterStore>,
    applier: Arc<BillingEventApplier>,
}

impl ReplayDeadLettersHandler {
    pub fn new(dead_letters: Arc<dyn DeadLetterStore>, applier: Arc<BillingEventApplier>) -> Self {
        Self {
            dead_letters,
            applier,
        }
    }

    pub async fn handle(&self, cmd: ReplayDeadLettersCommand) -> Result<ReplayReport, BillingError> {
        let pending = self.dead_letters.list_pending(cmd.limit).await?;

        let mut report = ReplayReport::default();
        for entry in pending {
            if self.replay(&entry).await? {
                report.replayed += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            "Dead letter replay finished"
        );
        Ok(report)
    }

    /// Returns whether the entry is done with.
    async fn replay(&self, entry: &DeadLetterEntry) -> Result<bool, BillingError> {
        let now = Timestamp::now();

        let event: GatewayEvent = match serde_json::from_value(entry.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                let error = format!("unreadable payload: {}", e);
                self.dead_letters
                    .record_failed_attempt(&entry.id, &error, now)
                    .await?;
                return Ok(false);
            }
        };

        match self.applier.apply(&event, now, true).await {
            Ok(result) => {
                tracing::info!(
                    event_id = %entry.event_id,
                    ignored = result.is_ignored(),
                    "Dead letter replayed"
                );
                self.dead_letters.mark_replayed(&entry.id, now).await?;
                Ok(true)
            }
            Err(e) if e.should_dead_letter() => {
                tracing::warn!(
                    event_id = %entry.event_id,
                    attempts = entry.attempts + 1,
                    error = %e,
                    "Dead letter replay failed"
                );
                self.dead_letters
                    .record_failed_attempt(&entry.id, &e.to_string(), now)
                    .await?;
                Ok(false)
            }
            Err(e) => {
                // Retrying cannot change the outcome
                tracing::warn!(
                    event_id = %entry.event_id,
                    kind = e.kind(),
                    error = %e,
                    "Dead letter closed without changes"
                );
                self.dead_letters.mark_replayed(&entry.id, now).await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryDeadLetterStore, InMemoryPaymentLedger, InMemorySubscriptionRepository,
        InMemoryUserDirectory,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::billing::test_support::user;
    use crate::domain::billing::{EntitlementLevel, PriceCatalog};
    use crate::ports::SubscriptionRepository;
    use serde_json::json;

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        directory: Arc<InMemoryUserDirectory>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
        handler: ReplayDeadLettersHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let applier = Arc::new(BillingEventApplier::new(
            subscriptions.clone(),
            Arc::new(InMemoryPaymentLedger::new()),
            directory.clone(),
            Arc::new(MockPaymentGateway::new()),
            PriceCatalog::new(),
        ));
        Fixture {
            subscriptions: subscriptions.clone(),
            directory,
            dead_letters: dead_letters.clone(),
            handler: ReplayDeadLettersHandler::new(dead_letters, applier),
        }
    }

    fn parked_checkout() -> DeadLetterEntry {
        let event = GatewayEvent::parse(
            &serde_json::to_vec(&json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "created": Timestamp::now().as_unix_secs(),
                "data": { "object": {
                    "id": "cs_1",
                    "customer": "cus_1",
                    "subscription": "sub_1",
                    "metadata": { "user_id": "user-1", "plan": "monthly" }
                }}
            }))
            .unwrap(),
        )
        .unwrap();
        DeadLetterEntry::new(
            event.id.clone(),
            event.event_type.clone(),
            serde_json::to_value(&event).unwrap(),
            "persistence_failure",
            "database unavailable",
            Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn replay_applies_parked_event_and_resyncs() {
        let f = fixture();
        f.dead_letters.record(&parked_checkout()).await.unwrap();

        let report = f
            .handler
            .handle(ReplayDeadLettersCommand { limit: 10 })
            .await
            .unwrap();

        assert_eq!(report, ReplayReport { replayed: 1, failed: 0 });
        assert!(f.subscriptions.find_by_user_id(&user()).await.unwrap().is_some());
        assert_eq!(f.directory.entitlement(&user()).await, Some(EntitlementLevel::Premium));
        assert!(f.dead_letters.list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_replay_stays_pending_with_attempt_counted() {
        let f = fixture();
        f.dead_letters.record(&parked_checkout()).await.unwrap();
        f.subscriptions.fail_writes(true);

        let report = f
            .handler
            .handle(ReplayDeadLettersCommand { limit: 10 })
            .await
            .unwrap();

        assert_eq!(report, ReplayReport { replayed: 0, failed: 1 });
        let pending = f.dead_letters.list_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
    }

    #[tokio::test]
    async fn replaying_twice_is_harmless() {
        let f = fixture();
        f.dead_letters.record(&parked_checkout()).await.unwrap();
        f.dead_letters.record(&parked_checkout()).await.unwrap();

        let report = f
            .handler
            .handle(ReplayDeadLettersCommand { limit: 10 })
            .await
            .unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(f.subscriptions.count().await, 1);
    }
}
