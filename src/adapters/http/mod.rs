//! HTTP adapters - REST API implementations.

pub mod billing;
pub mod error;
pub mod middleware;
mod router;

pub use billing::{billing_router, BillingAppState, BillingPorts, SIGNATURE_HEADER};
pub use error::{ApiError, ErrorResponse};
pub use router::app_router;
