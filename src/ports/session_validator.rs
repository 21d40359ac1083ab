//! Session validation port for bearer tokens.
//!
//! Subscriber and admin endpoints resolve the caller through this port.
//! The HS256 adapter checks a shared-secret JWT; tests use a token map.
//!
//! All implementations MUST validate:
//! - **Signature**: Token was issued by the session service
//! - **Issuer / audience**: When configured
//! - **Expiry (exp)**: Token must not be expired

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Validates access tokens and extracts user identity.
///
/// # Contract
///
/// Implementations must:
/// - Return `AuthError::InvalidToken` for malformed/bad signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a token (without the "Bearer " prefix) and return the caller.
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
