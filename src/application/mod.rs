//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers call the gateway and then merge; query handlers only read.

pub mod handlers;

pub use handlers::billing::{
    // Gateway notifications
    ApplyResult, BillingEventApplier, EntitlementSync, ProcessWebhookCommand,
    ProcessWebhookHandler, WebhookReceipt,
    // Subscriber commands
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    ChangePlanCommand, ChangePlanHandler, ChangePlanResult, ReactivateSubscriptionCommand,
    ReactivateSubscriptionHandler, RequestRefundCommand, RequestRefundHandler,
    RequestRefundResult, StartCheckoutCommand, StartCheckoutHandler,
    // Subscriber queries
    GetRefundEligibilityHandler, GetRefundEligibilityQuery, GetSubscriptionHandler,
    GetSubscriptionQuery, ListPaymentsHandler, ListPaymentsQuery, SubscriptionView,
    // Background and operator paths
    ExpireCancellationsHandler, ReplayDeadLettersCommand, ReplayDeadLettersHandler,
    ReplayReport, SweepReport,
};
