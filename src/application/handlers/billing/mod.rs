//! Billing handlers.
//!
//! Two entry points feed the same atomic merge:
//!
//! - gateway notifications (`process_webhook` → `apply_billing_event`), which
//!   are acknowledged whatever happens after verification
//! - subscriber commands (checkout, cancel, reactivate, change plan, refund),
//!   which call the gateway first and then merge locally
//!
//! `expire_cancellations` and `replay_dead_letters` are operator/background
//! paths over the same rules.

mod apply_billing_event;
mod cancel_subscription;
mod change_plan;
mod common;
mod entitlement_sync;
mod expire_cancellations;
mod get_subscription;
mod list_payments;
mod process_webhook;
mod reactivate_subscription;
mod refund;
mod replay_dead_letters;
mod start_checkout;

pub use apply_billing_event::{ApplyResult, BillingEventApplier};
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};
pub use entitlement_sync::EntitlementSync;
pub use expire_cancellations::{ExpireCancellationsHandler, SweepReport};
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView};
pub use list_payments::{ListPaymentsHandler, ListPaymentsQuery};
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, WebhookReceipt};
pub use reactivate_subscription::{ReactivateSubscriptionCommand, ReactivateSubscriptionHandler};
pub use refund::{
    GetRefundEligibilityHandler, GetRefundEligibilityQuery, RequestRefundCommand,
    RequestRefundHandler, RequestRefundResult,
};
pub use replay_dead_letters::{ReplayDeadLettersCommand, ReplayDeadLettersHandler, ReplayReport};
pub use start_checkout::{StartCheckoutCommand, StartCheckoutHandler};
