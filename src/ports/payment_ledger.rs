//! Payment ledger port.
//!
//! An append-only log of payment outcomes keyed by transaction id. Appending
//! an entry whose key already exists is a no-op, which is what makes
//! redelivered invoice notifications harmless.

use async_trait::async_trait;

use crate::domain::billing::PaymentRecord;
use crate::domain::foundation::{DomainError, UserId};

/// Result of appending a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// Entry was written.
    Inserted,
    /// An entry with the same transaction id already exists.
    Duplicate,
}

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Append `record` unless its transaction id is already present.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn append(&self, record: &PaymentRecord) -> Result<AppendResult, DomainError>;

    /// Entries for a user, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentRecord>, DomainError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError>;
}
