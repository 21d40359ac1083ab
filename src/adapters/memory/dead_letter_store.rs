use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DeadLetterId, DomainError, ErrorCode, Timestamp};
use crate::ports::{DeadLetterEntry, DeadLetterStore};

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.read().await.clone()
    }
}

fn not_found(id: &DeadLetterId) -> DomainError {
    DomainError::new(
        ErrorCode::DeadLetterNotFound,
        format!("dead letter {} not found", id),
    )
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, entry: &DeadLetterEntry) -> Result<(), DomainError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let mut pending: Vec<DeadLetterEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.failed_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_replayed(&self, id: &DeadLetterId, at: Timestamp) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| not_found(id))?;
        entry.replayed_at = Some(at);
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: &DeadLetterId,
        error: &str,
        _at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| not_found(id))?;
        entry.attempts += 1;
        entry.error = error.to_string();
        Ok(())
    }
}
