//! Dead letter store port.
//!
//! Verified notifications whose processing failed for infrastructure reasons
//! are parked here so an operator can replay them once the fault is fixed.
//! The gateway has already received a 200 for these; nothing else will
//! retry them.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DeadLetterId, DomainError, Timestamp};

/// A parked notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub event_id: String,
    pub event_type: String,
    /// The verified envelope as received.
    pub payload: serde_json::Value,
    /// Short error kind, e.g. `persistence`.
    pub error_kind: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: Timestamp,
    pub replayed_at: Option<Timestamp>,
}

impl DeadLetterEntry {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        error_kind: impl Into<String>,
        error: impl Into<String>,
        failed_at: Timestamp,
    ) -> Self {
        Self {
            id: DeadLetterId::new(),
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            error_kind: error_kind.into(),
            error: error.into(),
            attempts: 1,
            failed_at,
            replayed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.replayed_at.is_none()
    }
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Park an entry.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn record(&self, entry: &DeadLetterEntry) -> Result<(), DomainError>;

    /// Entries not yet replayed, oldest first.
    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError>;

    /// Mark an entry as successfully replayed.
    ///
    /// # Errors
    ///
    /// - `DeadLetterNotFound` if the entry doesn't exist
    async fn mark_replayed(&self, id: &DeadLetterId, at: Timestamp) -> Result<(), DomainError>;

    /// Bump the attempt counter after a failed replay.
    ///
    /// # Errors
    ///
    /// - `DeadLetterNotFound` if the entry doesn't exist
    async fn record_failed_attempt(
        &self,
        id: &DeadLetterId,
        error: &str,
        at: Timestamp,
    ) -> Result<(), DomainError>;
}
