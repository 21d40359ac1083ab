//! BillingEventApplier - turns a verified gateway event into state changes.
//!
//! Shared by live webhook processing and dead-letter replay. Every step is
//! idempotent: merges skip duplicates and stale events, ledger appends are
//! keyed by transaction id and entitlement pushes only follow real flips.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEvent, CheckoutActivation, CheckoutCompleted, GatewayEvent,
    InvoiceNotice, LifecycleState, PaymentRecord, Plan, PriceCatalog, ProviderSnapshot,
    SubscriptionChange, SubscriptionNotice, WebhookError,
};
use crate::domain::foundation::{CustomerId, DomainError, StateMachine, Timestamp, UserId};
use crate::ports::{
    AppendResult, MergeOutcome, PaymentGateway, PaymentLedger, SubscriptionRepository,
    UserDirectory,
};

use super::entitlement_sync::EntitlementSync;

/// What happened to an event that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// State or ledger changed.
    Applied {
        kind: &'static str,
        user_id: UserId,
    },
    /// Verified and understood, but nothing changed.
    Ignored {
        kind: &'static str,
        user_id: Option<UserId>,
        reason: &'static str,
    },
}

impl ApplyResult {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            ApplyResult::Applied { user_id, .. } => Some(user_id),
            ApplyResult::Ignored { user_id, .. } => user_id.as_ref(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ApplyResult::Ignored { .. })
    }
}

pub struct BillingEventApplier {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn PaymentLedger>,
    directory: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: EntitlementSync,
    catalog: PriceCatalog,
}

impl BillingEventApplier {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn PaymentLedger>,
        directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: PriceCatalog,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            entitlements: EntitlementSync::new(directory.clone()),
            directory,
            gateway,
            catalog,
        }
    }

    /// Classify `event` and apply it.
    ///
    /// With `resync`, the user's entitlement is pushed from the stored record
    /// afterwards even if no flip was observed; replay uses this because an
    /// earlier attempt may have stopped between the merge and the push.
    pub async fn apply(
        &self,
        event: &GatewayEvent,
        now: Timestamp,
        resync: bool,
    ) -> Result<ApplyResult, WebhookError> {
        let billing_event = BillingEvent::classify(event, now)?;
        let kind = billing_event.kind();

        let result = match billing_event {
            BillingEvent::CheckoutCompleted(checkout) => self.checkout_completed(checkout, now).await?,
            BillingEvent::SubscriptionUpdated(notice) => {
                self.subscription_changed(notice, kind, false, now).await?
            }
            BillingEvent::SubscriptionDeleted(notice) => {
                self.subscription_changed(notice, kind, true, now).await?
            }
            BillingEvent::InvoicePaid(invoice) => self.invoice(invoice, kind, true, now).await?,
            BillingEvent::InvoicePaymentFailed(invoice) => {
                self.invoice(invoice, kind, false, now).await?
            }
            BillingEvent::Unrecognized(event_type) => {
                tracing::debug!(event_id = %event.id, event_type = %event_type, "Ignoring unrecognized event");
                ApplyResult::Ignored {
                    kind,
                    user_id: None,
                    reason: "unrecognized_event",
                }
            }
        };

        if resync {
            if let Some(user_id) = result.user_id() {
                let current = self
                    .subscriptions
                    .find_by_user_id(user_id)
                    .await
                    .map_err(persistence)?;
                self.entitlements
                    .resync(user_id, current.as_ref())
                    .await
                    .map_err(collaborator)?;
            }
        }

        Ok(result)
    }

    async fn checkout_completed(
        &self,
        checkout: CheckoutCompleted,
        now: Timestamp,
    ) -> Result<ApplyResult, WebhookError> {
        const KIND: &str = "checkout_completed";

        self.directory
            .link_customer(&checkout.customer_id, &checkout.user_id)
            .await
            .map_err(collaborator)?;

        let plan = match checkout.subscription_id.as_deref() {
            Some(subscription_id) => self.authoritative_plan(subscription_id, checkout.plan).await,
            None => checkout.plan,
        };

        let change = SubscriptionChange::Checkout(CheckoutActivation {
            customer_id: checkout.customer_id.clone(),
            subscription_id: checkout.subscription_id.clone(),
            plan,
            payment_method: checkout.payment_method.clone(),
            transaction_id: Some(checkout.transaction_id.clone()),
            event: checkout.event.clone(),
        });
        let outcome = self.merge(&checkout.user_id, &change, now).await?;

        let mut ledger_changed = false;
        if let Some(amount) = checkout.amount_total {
            let record = PaymentRecord::success(
                checkout.user_id.clone(),
                checkout.subscription_id.clone(),
                checkout.transaction_id.clone(),
                checkout.invoice_id.clone(),
                amount,
                checkout.currency.clone(),
                false,
                now,
            );
            ledger_changed = self.append(&record).await? == AppendResult::Inserted;
        }

        self.entitlements
            .sync(&checkout.user_id, &outcome)
            .await
            .map_err(collaborator)?;

        Ok(self.result(KIND, checkout.user_id, &outcome, ledger_changed))
    }

    async fn subscription_changed(
        &self,
        notice: SubscriptionNotice,
        kind: &'static str,
        deleted: bool,
        now: Timestamp,
    ) -> Result<ApplyResult, WebhookError> {
        let user_id = self.resolve_customer(&notice.customer_id).await?;

        let change = if deleted {
            SubscriptionChange::ProviderDeleted {
                subscription_id: notice.subscription_id.clone(),
                event: notice.event.clone(),
            }
        } else {
            let plan = notice
                .price_id
                .as_deref()
                .and_then(|price| self.catalog.plan_for_price(price))
                .or(notice.metadata_plan);
            SubscriptionChange::ProviderSnapshot(ProviderSnapshot {
                subscription_id: notice.subscription_id.clone(),
                status: notice.status.clone(),
                cancel_at_period_end: notice.cancel_at_period_end,
                current_period_end: notice.current_period_end,
                plan,
                event: notice.event.clone(),
            })
        };

        let outcome = self.merge(&user_id, &change, now).await?;
        self.entitlements
            .sync(&user_id, &outcome)
            .await
            .map_err(collaborator)?;

        Ok(self.result(kind, user_id, &outcome, false))
    }

    async fn invoice(
        &self,
        invoice: InvoiceNotice,
        kind: &'static str,
        paid: bool,
        now: Timestamp,
    ) -> Result<ApplyResult, WebhookError> {
        let user_id = self.resolve_customer(&invoice.customer_id).await?;

        let record = if paid {
            PaymentRecord::success(
                user_id.clone(),
                invoice.subscription_id.clone(),
                invoice.transaction_id.clone(),
                Some(invoice.invoice_id.clone()),
                invoice.amount,
                invoice.currency.clone(),
                invoice.is_renewal,
                invoice.occurred_at,
            )
        } else {
            PaymentRecord::failure(
                user_id.clone(),
                invoice.subscription_id.clone(),
                invoice.transaction_id.clone(),
                Some(invoice.invoice_id.clone()),
                invoice.amount,
                invoice.currency.clone(),
                invoice
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "payment failed".to_string()),
                invoice.occurred_at,
            )
        };

        let inserted = self.append(&record).await? == AppendResult::Inserted;

        if paid {
            let change = SubscriptionChange::PaymentRecorded {
                transaction_id: invoice.transaction_id.clone(),
                paid_at: invoice.occurred_at,
                payment_method: None,
            };
            // Runs for duplicates too: a ledger write may have outlived a failed merge.
            // Status is left to subscription notices; this only tracks the last payment.
            let outcome = self.merge(&user_id, &change, now).await?;
            return Ok(self.result(kind, user_id, &outcome, inserted));
        }

        if !inserted {
            return Ok(ApplyResult::Ignored {
                kind,
                user_id: Some(user_id),
                reason: "duplicate_transaction",
            });
        }
        tracing::warn!(
            user_id = %user_id,
            invoice_id = %invoice.invoice_id,
            reason = record.failure_reason.as_deref().unwrap_or_default(),
            "Invoice payment failed"
        );

        Ok(ApplyResult::Applied { kind, user_id })
    }

    /// Plan implied by the gateway's price, falling back to `fallback`.
    async fn authoritative_plan(&self, subscription_id: &str, fallback: Plan) -> Plan {
        match self.gateway.retrieve_subscription(subscription_id).await {
            Ok(subscription) => subscription
                .price_id
                .as_deref()
                .and_then(|price| self.catalog.plan_for_price(price))
                .unwrap_or(fallback),
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Could not retrieve subscription, using checkout metadata plan"
                );
                fallback
            }
        }
    }

    async fn resolve_customer(&self, customer_id: &CustomerId) -> Result<UserId, WebhookError> {
        self.directory
            .user_id_for_customer(customer_id)
            .await
            .map_err(collaborator)?
            .ok_or_else(|| WebhookError::UnresolvedCustomer(customer_id.to_string()))
    }

    async fn merge(
        &self,
        user_id: &UserId,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<MergeOutcome, WebhookError> {
        let outcome = self
            .subscriptions
            .merge(user_id, change, now)
            .await
            .map_err(|e| match e {
                BillingError::Gateway(detail) => WebhookError::Collaborator(detail),
                other => WebhookError::Persistence(other.to_string()),
            })?;

        match &outcome {
            MergeOutcome::Applied { previous, current } => {
                let from = previous
                    .as_ref()
                    .map_or(LifecycleState::None, |p| p.lifecycle(now));
                let to = current.lifecycle(now);
                if !from.can_transition_to(&to) {
                    tracing::warn!(
                        user_id = %user_id,
                        change = change.name(),
                        from = ?from,
                        to = ?to,
                        "Gateway reported a transition outside the lifecycle table"
                    );
                }
            }
            MergeOutcome::Skipped { reason, .. } => {
                tracing::info!(
                    user_id = %user_id,
                    change = change.name(),
                    reason = reason.as_str(),
                    "Merge skipped"
                );
            }
        }
        Ok(outcome)
    }

    async fn append(&self, record: &PaymentRecord) -> Result<AppendResult, WebhookError> {
        let result = self.ledger.append(record).await.map_err(persistence)?;
        if result == AppendResult::Duplicate {
            tracing::debug!(
                transaction_id = %record.transaction_id,
                "Ledger entry already recorded"
            );
        }
        Ok(result)
    }

    fn result(
        &self,
        kind: &'static str,
        user_id: UserId,
        outcome: &MergeOutcome,
        ledger_changed: bool,
    ) -> ApplyResult {
        match outcome.skip_reason() {
            Some(reason) if !ledger_changed => ApplyResult::Ignored {
                kind,
                user_id: Some(user_id),
                reason: reason.as_str(),
            },
            _ => ApplyResult::Applied { kind, user_id },
        }
    }
}

fn persistence(err: DomainError) -> WebhookError {
    WebhookError::Persistence(err.to_string())
}

fn collaborator(err: DomainError) -> WebhookError {
    WebhookError::Collaborator(err.to_string())
}
