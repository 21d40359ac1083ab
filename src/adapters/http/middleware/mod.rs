//! HTTP middleware for axum.
//!
//! - `auth` - Bearer token validation and user extractors

pub mod auth;

pub use auth::{auth_middleware, AuthRejection, AuthState, RequireAdmin, RequireAuth};
