//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, auth)
//! - `billing` - Subscription lifecycle, ledger entries, pricing and refunds

pub mod billing;
pub mod foundation;
