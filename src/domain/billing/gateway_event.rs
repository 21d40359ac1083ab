//! Gateway notification envelope and event classification.
//!
//! The envelope is parsed once the signature checks out. Classification
//! turns the free-form `type` string into a closed enum so every consumed
//! kind is matched exhaustively downstream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::aggregate::EventStamp;
use super::payment_record::PaymentRecord;
use super::plan::Plan;
use super::status::ProviderStatus;
use super::webhook_errors::WebhookError;
use crate::domain::foundation::{CustomerId, Timestamp, UserId};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

/// Verified notification envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds when the gateway created the event.
    #[serde(default)]
    pub created: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<GatewayEventData>,

    /// Flat envelopes carry the object at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

impl GatewayEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    fn object_value(&self) -> Option<&serde_json::Value> {
        self.data
            .as_ref()
            .map(|d| &d.object)
            .or(self.object.as_ref())
    }

    fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        let value = self
            .object_value()
            .ok_or(WebhookError::MissingField("data.object"))?;
        T::deserialize(value).map_err(|_| WebhookError::MissingField("data.object"))
    }

    /// Event identity; a missing `created` falls back to `received_at`.
    pub fn stamp(&self, received_at: Timestamp) -> EventStamp {
        let created = self
            .created
            .and_then(Timestamp::try_from_unix_secs)
            .unwrap_or(received_at);
        EventStamp::new(self.id.clone(), created)
    }
}

/// A gateway id that may arrive either bare or as an expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

fn expand(value: Option<Expandable>) -> Option<String> {
    value.map(Expandable::into_id).filter(|id| !id.is_empty())
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    customer: Option<Expandable>,
    subscription: Option<Expandable>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    invoice: Option<Expandable>,
    payment_intent: Option<Expandable>,
    #[serde(default)]
    payment_method_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<Expandable>,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    items: Option<SubscriptionItems>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    price: Option<Expandable>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    customer: Option<Expandable>,
    subscription: Option<Expandable>,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    currency: Option<String>,
    billing_reason: Option<String>,
    #[serde(default)]
    attempt_count: u32,
    last_finalization_error: Option<InvoiceError>,
    status_transitions: Option<InvoiceTransitions>,
}

#[derive(Debug, Deserialize)]
struct InvoiceError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceTransitions {
    paid_at: Option<i64>,
}

/// Completed checkout with its required metadata resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub event: EventStamp,
    pub session_id: String,
    pub customer_id: CustomerId,
    pub subscription_id: Option<String>,
    pub user_id: UserId,
    pub plan: Plan,
    pub amount_total: Option<i64>,
    pub currency: String,
    pub invoice_id: Option<String>,
    /// Ledger dedup key for the initial payment.
    pub transaction_id: String,
    pub payment_method: Option<String>,
}

/// Absolute subscription fields from an updated/deleted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionNotice {
    pub event: EventStamp,
    pub subscription_id: String,
    pub customer_id: CustomerId,
    pub status: ProviderStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<Timestamp>,
    pub metadata_plan: Option<Plan>,
    pub price_id: Option<String>,
}

/// Invoice payment outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceNotice {
    pub event: EventStamp,
    pub invoice_id: String,
    pub customer_id: CustomerId,
    pub subscription_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// Ledger dedup key.
    pub transaction_id: String,
    pub is_renewal: bool,
    pub failure_reason: Option<String>,
    pub occurred_at: Timestamp,
}

/// Closed set of notification kinds this service reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionNotice),
    SubscriptionDeleted(SubscriptionNotice),
    InvoicePaid(InvoiceNotice),
    InvoicePaymentFailed(InvoiceNotice),
    Unrecognized(String),
}

impl BillingEvent {
    /// Classifies a verified envelope.
    ///
    /// Fails with a missing-field error when a consumed kind lacks what its
    /// transition needs; never guesses a default.
    pub fn classify(event: &GatewayEvent, received_at: Timestamp) -> Result<Self, WebhookError> {
        let stamp = event.stamp(received_at);
        match event.event_type.as_str() {
            CHECKOUT_COMPLETED => {
                checkout_completed(event.object()?, stamp).map(BillingEvent::CheckoutCompleted)
            }
            SUBSCRIPTION_UPDATED => {
                subscription_notice(event.object()?, stamp).map(BillingEvent::SubscriptionUpdated)
            }
            SUBSCRIPTION_DELETED => {
                subscription_notice(event.object()?, stamp).map(BillingEvent::SubscriptionDeleted)
            }
            INVOICE_PAID | INVOICE_PAYMENT_SUCCEEDED => {
                invoice_notice(event.object()?, stamp, true).map(BillingEvent::InvoicePaid)
            }
            INVOICE_PAYMENT_FAILED => {
                invoice_notice(event.object()?, stamp, false).map(BillingEvent::InvoicePaymentFailed)
            }
            other => Ok(BillingEvent::Unrecognized(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::CheckoutCompleted(_) => "checkout_completed",
            BillingEvent::SubscriptionUpdated(_) => "subscription_updated",
            BillingEvent::SubscriptionDeleted(_) => "subscription_deleted",
            BillingEvent::InvoicePaid(_) => "invoice_paid",
            BillingEvent::InvoicePaymentFailed(_) => "invoice_payment_failed",
            BillingEvent::Unrecognized(_) => "unrecognized",
        }
    }
}

fn metadata_value<'a>(metadata: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| metadata.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn customer(value: Option<Expandable>) -> Result<CustomerId, WebhookError> {
    let id = expand(value).ok_or(WebhookError::MissingField("customer"))?;
    CustomerId::new(id).map_err(|_| WebhookError::MissingField("customer"))
}

fn checkout_completed(
    session: CheckoutSessionObject,
    event: EventStamp,
) -> Result<CheckoutCompleted, WebhookError> {
    let user_id = metadata_value(&session.metadata, &["user_id", "userId"])
        .map(str::to_string)
        .or(session.client_reference_id.clone())
        .and_then(|id| UserId::new(id).ok())
        .ok_or(WebhookError::MissingUserId)?;

    let plan = metadata_value(&session.metadata, &["plan"]).ok_or(WebhookError::MissingPlan)?;
    let plan = Plan::parse(plan).map_err(|_| WebhookError::InvalidPlan(plan.to_string()))?;

    let customer_id = customer(session.customer)?;
    let invoice_id = expand(session.invoice);
    let transaction_id = invoice_id
        .as_deref()
        .map(PaymentRecord::success_key)
        .or_else(|| expand(session.payment_intent))
        .unwrap_or_else(|| session.id.clone());

    Ok(CheckoutCompleted {
        event,
        session_id: session.id,
        customer_id,
        subscription_id: expand(session.subscription),
        user_id,
        plan,
        amount_total: session.amount_total,
        currency: session
            .currency
            .unwrap_or_else(|| plan.currency().to_string()),
        invoice_id,
        transaction_id,
        payment_method: session.payment_method_types.into_iter().next(),
    })
}

fn subscription_notice(
    subscription: SubscriptionObject,
    event: EventStamp,
) -> Result<SubscriptionNotice, WebhookError> {
    let price_id = subscription
        .items
        .and_then(|items| items.data.into_iter().next())
        .and_then(|item| expand(item.price));

    Ok(SubscriptionNotice {
        event,
        customer_id: customer(subscription.customer)?,
        status: ProviderStatus::parse(&subscription.status),
        cancel_at_period_end: subscription.cancel_at_period_end,
        current_period_end: subscription
            .current_period_end
            .and_then(Timestamp::try_from_unix_secs),
        metadata_plan: metadata_value(&subscription.metadata, &["plan"])
            .and_then(|p| Plan::parse(p).ok()),
        price_id,
        subscription_id: subscription.id,
    })
}

fn invoice_notice(
    invoice: InvoiceObject,
    event: EventStamp,
    paid: bool,
) -> Result<InvoiceNotice, WebhookError> {
    let customer_id = customer(invoice.customer)?;
    let (amount, transaction_id, failure_reason) = if paid {
        (invoice.amount_paid, PaymentRecord::success_key(&invoice.id), None)
    } else {
        let attempt = invoice.attempt_count.max(1);
        let reason = invoice
            .last_finalization_error
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("payment attempt {} failed", attempt));
        (
            invoice.amount_due,
            PaymentRecord::failure_key(&invoice.id, attempt),
            Some(reason),
        )
    };
    let occurred_at = invoice
        .status_transitions
        .and_then(|t| t.paid_at)
        .and_then(Timestamp::try_from_unix_secs)
        .filter(|_| paid)
        .unwrap_or(event.created);

    Ok(InvoiceNotice {
        event,
        customer_id,
        subscription_id: expand(invoice.subscription),
        amount,
        currency: invoice.currency.unwrap_or_else(|| "usd".to_string()),
        transaction_id,
        is_renewal: invoice.billing_reason.as_deref() == Some("subscription_cycle"),
        failure_reason,
        occurred_at,
        invoice_id: invoice.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn received() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_500)
    }

    fn envelope(event_type: &str, object: serde_json::Value) -> GatewayEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_700_000_000,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn checkout_object() -> serde_json::Value {
        json!({
            "id": "cs_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "metadata": { "user_id": "user-1", "plan": "premium" },
            "amount_total": 1999,
            "currency": "usd",
            "invoice": "in_1",
            "payment_method_types": ["card"]
        })
    }

    #[test]
    fn classifies_checkout_completed() {
        let event = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, checkout_object()), received())
            .unwrap();
        match event {
            BillingEvent::CheckoutCompleted(checkout) => {
                assert_eq!(checkout.user_id.as_str(), "user-1");
                assert_eq!(checkout.plan, Plan::Premium);
                assert_eq!(checkout.customer_id.as_str(), "cus_1");
                assert_eq!(checkout.subscription_id.as_deref(), Some("sub_1"));
                assert_eq!(checkout.transaction_id, "in_1");
                assert_eq!(checkout.payment_method.as_deref(), Some("card"));
                assert_eq!(checkout.event.created, Timestamp::from_unix_secs(1_700_000_000));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn checkout_falls_back_to_client_reference_id() {
        let mut object = checkout_object();
        object["metadata"] = json!({ "plan": "monthly" });
        object["client_reference_id"] = json!("user-9");
        let event = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, object), received()).unwrap();
        assert!(matches!(event, BillingEvent::CheckoutCompleted(ref c) if c.user_id.as_str() == "user-9"));
    }

    #[test]
    fn checkout_without_user_id_is_missing_user_id() {
        let mut object = checkout_object();
        object["metadata"] = json!({ "plan": "monthly" });
        let result = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, object), received());
        assert_eq!(result, Err(WebhookError::MissingUserId));
    }

    #[test]
    fn checkout_without_plan_is_missing_plan() {
        let mut object = checkout_object();
        object["metadata"] = json!({ "user_id": "user-1" });
        let result = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, object), received());
        assert_eq!(result, Err(WebhookError::MissingPlan));
    }

    #[test]
    fn checkout_with_unknown_plan_is_rejected() {
        let mut object = checkout_object();
        object["metadata"]["plan"] = json!("platinum");
        let result = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, object), received());
        assert_eq!(result, Err(WebhookError::InvalidPlan("platinum".into())));
    }

    #[test]
    fn checkout_without_invoice_uses_payment_intent_key() {
        let mut object = checkout_object();
        object["invoice"] = serde_json::Value::Null;
        object["payment_intent"] = json!({ "id": "pi_1" });
        let event = BillingEvent::classify(&envelope(CHECKOUT_COMPLETED, object), received()).unwrap();
        assert!(matches!(event, BillingEvent::CheckoutCompleted(ref c) if c.transaction_id == "pi_1"));
    }

    #[test]
    fn classifies_subscription_updated_with_absolute_fields() {
        let object = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "cancel_at_period_end": true,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "price": { "id": "price_premium" } } ] }
        });
        let event = BillingEvent::classify(&envelope(SUBSCRIPTION_UPDATED, object), received()).unwrap();
        match event {
            BillingEvent::SubscriptionUpdated(notice) => {
                assert!(notice.cancel_at_period_end);
                assert_eq!(notice.status, ProviderStatus::Active);
                assert_eq!(
                    notice.current_period_end,
                    Some(Timestamp::from_unix_secs(1_702_592_000))
                );
                assert_eq!(notice.price_id.as_deref(), Some("price_premium"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classifies_subscription_deleted() {
        let object = json!({ "id": "sub_1", "customer": "cus_1", "status": "canceled" });
        let event = BillingEvent::classify(&envelope(SUBSCRIPTION_DELETED, object), received()).unwrap();
        assert_eq!(event.kind(), "subscription_deleted");
    }

    #[test]
    fn subscription_event_without_customer_is_missing_field() {
        let object = json!({ "id": "sub_1", "status": "active" });
        let result = BillingEvent::classify(&envelope(SUBSCRIPTION_UPDATED, object), received());
        assert_eq!(result, Err(WebhookError::MissingField("customer")));
    }

    #[test]
    fn classifies_renewal_invoice_paid() {
        let object = json!({
            "id": "in_2",
            "customer": "cus_1",
            "subscription": "sub_1",
            "amount_paid": 999,
            "currency": "usd",
            "billing_reason": "subscription_cycle"
        });
        let event = BillingEvent::classify(&envelope(INVOICE_PAID, object), received()).unwrap();
        match event {
            BillingEvent::InvoicePaid(invoice) => {
                assert_eq!(invoice.amount, 999);
                assert_eq!(invoice.transaction_id, "in_2");
                assert!(invoice.is_renewal);
                assert_eq!(invoice.failure_reason, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn legacy_payment_succeeded_is_invoice_paid() {
        let object = json!({ "id": "in_2", "customer": "cus_1", "amount_paid": 10 });
        let event =
            BillingEvent::classify(&envelope(INVOICE_PAYMENT_SUCCEEDED, object), received()).unwrap();
        assert_eq!(event.kind(), "invoice_paid");
    }

    #[test]
    fn failed_invoice_keys_by_attempt() {
        let object = json!({
            "id": "in_3",
            "customer": "cus_1",
            "amount_due": 1999,
            "attempt_count": 2
        });
        let event = BillingEvent::classify(&envelope(INVOICE_PAYMENT_FAILED, object), received()).unwrap();
        match event {
            BillingEvent::InvoicePaymentFailed(invoice) => {
                assert_eq!(invoice.transaction_id, "in_3:attempt-2");
                assert_eq!(invoice.amount, 1999);
                assert_eq!(invoice.failure_reason.as_deref(), Some("payment attempt 2 failed"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let event = BillingEvent::classify(
            &envelope("customer.created", json!({ "id": "cus_1" })),
            received(),
        )
        .unwrap();
        assert_eq!(event, BillingEvent::Unrecognized("customer.created".into()));
    }

    #[test]
    fn flat_envelope_object_is_accepted() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "id": "evt_flat",
            "type": SUBSCRIPTION_DELETED,
            "object": { "id": "sub_1", "customer": "cus_1", "status": "canceled" }
        }))
        .unwrap();
        let classified = BillingEvent::classify(&event, received()).unwrap();
        match classified {
            BillingEvent::SubscriptionDeleted(notice) => {
                assert_eq!(notice.event.created, received());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_object_is_missing_field() {
        let event: GatewayEvent =
            serde_json::from_value(json!({ "id": "evt_x", "type": INVOICE_PAID })).unwrap();
        assert_eq!(
            BillingEvent::classify(&event, received()),
            Err(WebhookError::MissingField("data.object"))
        );
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(matches!(
            GatewayEvent::parse(b"not json"),
            Err(WebhookError::ParseError(_))
        ));
    }
}
