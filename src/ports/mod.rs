//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `SubscriptionRepository` - Per-user subscription record with atomic merge
//! - `PaymentLedger` - Append-only payment history, deduplicated by transaction id
//! - `DeadLetterStore` - Failed notifications awaiting replay
//!
//! ## Collaborator Ports
//!
//! - `PaymentGateway` - Checkout, cancellation, plan swaps and refunds
//! - `UserDirectory` - Customer-to-user lookup and entitlement push
//! - `SessionValidator` - Bearer token validation

mod dead_letter_store;
mod payment_gateway;
mod payment_ledger;
mod session_validator;
mod subscription_repository;
mod user_directory;

pub use dead_letter_store::{DeadLetterEntry, DeadLetterStore};
pub use payment_gateway::{
    CheckoutRequest, CheckoutSession, GatewaySubscription, PaymentError, PaymentErrorCode,
    PaymentGateway, RefundReceipt, RefundRequest,
};
pub use payment_ledger::{AppendResult, PaymentLedger};
pub use session_validator::SessionValidator;
pub use subscription_repository::{MergeOutcome, SubscriptionRepository};
pub use user_directory::UserDirectory;
