//! Adapters - Implementations of port interfaces.
//!
//! - `memory` - In-memory stores for tests and local runs
//! - `postgres` - sqlx-backed stores
//! - `stripe` - Payment gateway over the Stripe REST API, plus a scriptable mock
//! - `auth` - Session validators (HS256 JWT, mock)
//! - `http` - axum routes, extractors and error mapping

pub mod auth;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
