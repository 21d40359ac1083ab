//! Subscription billing
//!
//! Reconciles payment-gateway notifications and subscriber actions into a
//! single per-user subscription record, keeps entitlements in step with it,
//! and handles proration, refunds, the payment ledger and dead-letter replay.
//!
//! Layout:
//!
//! - `domain` - subscription state machine, plans, proration and refund rules
//! - `ports` - async traits for storage and collaborators
//! - `application` - command and query handlers
//! - `adapters` - Postgres, Stripe, in-memory, auth and HTTP implementations
//! - `config` - environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
