//! Billing domain - subscription state, ledger entries and pricing rules.
//!
//! # Module Organization
//!
//! - `aggregate` - Subscription record and its merge rules
//! - `status` - Stored status enums and the lifecycle state machine
//! - `plan` - Plan catalog, cadence and gateway price mapping
//! - `entitlement` - Access levels and when to push them
//! - `payment_record` - Immutable ledger entries
//! - `proration` - Plan-change charge/credit
//! - `refund` - Refund window and amount
//! - `gateway_event` - Notification envelope and classification
//! - `webhook_verifier` - Signature verification
//! - `errors` / `webhook_errors` - Error types

mod aggregate;
mod entitlement;
mod errors;
mod gateway_event;
mod payment_record;
mod plan;
mod proration;
mod refund;
mod status;
mod webhook_errors;
mod webhook_verifier;

pub use aggregate::{
    CheckoutActivation, EventStamp, MergeDecision, ProviderSnapshot, SkipReason, Subscription,
    SubscriptionChange,
};
pub use entitlement::{EntitlementChange, EntitlementLevel};
pub use errors::BillingError;
pub use gateway_event::{
    BillingEvent, CheckoutCompleted, GatewayEvent, GatewayEventData, InvoiceNotice,
    SubscriptionNotice,
};
pub use payment_record::{PaymentRecord, PaymentStatus};
pub use plan::{Cadence, Plan, PriceCatalog};
pub use proration::{quote_plan_change, ProrationQuote};
pub use refund::{evaluate_refund, prorated_refund_amount, RefundEligibility};
pub use status::{
    CancelationType, LifecycleState, ProviderStatus, RefundStatus, SubscriptionStatus,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier};
