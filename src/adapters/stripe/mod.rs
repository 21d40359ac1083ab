//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port against the Stripe REST API, plus a
//! scriptable mock for tests and local runs.
//!
//! # Security
//!
//! - The API key is held in `secrecy::SecretString` and only exposed to build
//!   the basic-auth header
//! - Notification signatures are verified in the domain, not here

mod mock_payment_gateway;
mod stripe_adapter;

pub use mock_payment_gateway::{mock_price_id, MethodCall, MockPaymentGateway};
pub use stripe_adapter::{StripeConfig, StripePaymentGateway};
