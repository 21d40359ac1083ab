//! Authentication types for the domain layer.
//!
//! The identity collaborator decodes bearer tokens into an
//! `AuthenticatedUser` carrying only `{id, role}`. Any token issuer can
//! populate it through the `SessionValidator` port.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserId;

/// Role claim carried by the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// Authenticated user extracted from a validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// The unique user identifier from the identity provider.
    pub id: UserId,

    /// Role used for operator-only endpoints.
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn new(id: UserId, role: UserRole) -> Self {
        Self { id, role }
    }

    /// Fails with `InsufficientPermissions` unless the user is an admin.
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }
}

/// Authentication errors that can occur during token validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Authenticated, but lacking the role this action needs.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The identity collaborator is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the user should re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AuthError::InvalidToken | AuthError::TokenExpired)
    }
}
