//! ProcessWebhookHandler - entry point for gateway notifications.
//!
//! Verification failures are the only errors returned to the caller. Once a
//! payload is trusted, every outcome is acknowledged; failures that lost
//! work are parked in the dead-letter store and logged with `alert = true`.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{GatewayEvent, WebhookError, WebhookVerifier};
use crate::domain::foundation::Timestamp;
use crate::ports::{DeadLetterEntry, DeadLetterStore};

use super::apply_billing_event::{ApplyResult, BillingEventApplier};

/// Command to process a notification.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, unparsed.
    pub payload: Vec<u8>,
    /// Signature header, if the request had one.
    pub signature: Option<String>,
}

/// Acknowledgement returned for a verified notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReceipt {
    /// State or ledger changed.
    Applied { event_id: String, kind: &'static str },
    /// Nothing to do (unrecognized kind, duplicate, stale, ...).
    Ignored { event_id: String, reason: &'static str },
    /// Could not be applied and retrying would not help (missing data).
    Rejected { event_id: String, error_kind: &'static str },
    /// Could not be applied; parked for replay.
    DeadLettered { event_id: String, error_kind: &'static str },
}

impl WebhookReceipt {
    /// True when the receipt reports that no state changed.
    pub fn ignored(&self) -> bool {
        matches!(
            self,
            WebhookReceipt::Ignored { .. } | WebhookReceipt::Rejected { .. }
        )
    }
}

pub struct ProcessWebhookHandler {
    verifier: WebhookVerifier,
    applier: Arc<BillingEventApplier>,
    dead_letters: Arc<dyn DeadLetterStore>,
    budget: Duration,
}

impl ProcessWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        applier: Arc<BillingEventApplier>,
        dead_letters: Arc<dyn DeadLetterStore>,
        budget: Duration,
    ) -> Self {
        Self {
            verifier,
            applier,
            dead_letters,
            budget,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<WebhookReceipt, WebhookError> {
        // 1. Nothing in the payload is trusted before this succeeds
        let signature = cmd
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, signature)
            .map_err(|e| {
                tracing::warn!(error = %e, kind = e.kind(), "Rejected webhook");
                e
            })?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook verified"
        );

        // 2. Apply within the response budget
        let now = Timestamp::now();
        let applied = match tokio::time::timeout(self.budget, self.applier.apply(&event, now, false)).await {
            Ok(result) => result,
            Err(_) => Err(WebhookError::BudgetExceeded(self.budget.as_millis() as u64)),
        };

        // 3. Acknowledge whatever happened
        Ok(match applied {
            Ok(ApplyResult::Applied { kind, .. }) => WebhookReceipt::Applied {
                event_id: event.id,
                kind,
            },
            Ok(ApplyResult::Ignored { reason, .. }) => WebhookReceipt::Ignored {
                event_id: event.id,
                reason,
            },
            Err(err) if err.should_dead_letter() => {
                self.dead_letter(&event, &err, now).await;
                WebhookReceipt::DeadLettered {
                    event_id: event.id,
                    error_kind: err.kind(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    kind = err.kind(),
                    error = %err,
                    "Webhook acknowledged without changes"
                );
                WebhookReceipt::Rejected {
                    event_id: event.id,
                    error_kind: err.kind(),
                }
            }
        })
    }

    async fn dead_letter(&self, event: &GatewayEvent, err: &WebhookError, now: Timestamp) {
        tracing::error!(
            alert = true,
            event_id = %event.id,
            event_type = %event.event_type,
            kind = err.kind(),
            error = %err,
            "Webhook processing failed, parking for replay"
        );

        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(alert = true, event_id = %event.id, error = %e, "Could not serialize event for dead letter");
                return;
            }
        };
        let entry = DeadLetterEntry::new(
            event.id.clone(),
            event.event_type.clone(),
            payload,
            err.kind(),
            err.to_string(),
            now,
        );
        if let Err(e) = self.dead_letters.record(&entry).await {
            tracing::error!(
                alert = true,
                event_id = %event.id,
                error = %e,
                "Could not record dead letter"
            );
        }
    }
}
