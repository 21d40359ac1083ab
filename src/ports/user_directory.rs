//! User directory port.
//!
//! The billing service does not own user accounts. It needs two things from
//! whoever does: which user a gateway customer belongs to, and a place to
//! push the user's entitlement level.

use async_trait::async_trait;

use crate::domain::billing::EntitlementLevel;
use crate::domain::foundation::{CustomerId, DomainError, UserId};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the user owning a gateway customer.
    ///
    /// Returns `None` if the customer was never linked.
    async fn user_id_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<UserId>, DomainError>;

    /// Link a gateway customer to a user. Relinking the same pair is a no-op.
    async fn link_customer(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError>;

    /// Set the user's entitlement level. Idempotent.
    ///
    /// # Errors
    ///
    /// - `DirectoryError` when the directory is unreachable
    async fn set_entitlement(
        &self,
        user_id: &UserId,
        level: EntitlementLevel,
    ) -> Result<(), DomainError>;
}
