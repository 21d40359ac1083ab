//! HTTP adapter for billing endpoints.
//!
//! - `/subscription/*` - subscriber API (bearer token)
//! - `/admin/billing/*` - operator API (admin role)
//! - `POST /webhooks/payment` - gateway notifications (signature verified)

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingAppState, BillingPorts, SIGNATURE_HEADER};
pub use routes::billing_router;
