use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::PaymentRecord;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{AppendResult, PaymentLedger};

#[derive(Default)]
pub struct InMemoryPaymentLedger {
    entries: RwLock<Vec<PaymentRecord>>,
    fail_appends: AtomicBool,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<PaymentRecord> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn append(&self, record: &PaymentRecord) -> Result<AppendResult, DomainError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(DomainError::database("ledger unavailable"));
        }
        let mut entries = self.entries.write().await;
        if entries
            .iter()
            .any(|e| e.transaction_id == record.transaction_id)
        {
            return Ok(AppendResult::Duplicate);
        }
        entries.push(record.clone());
        Ok(AppendResult::Inserted)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentRecord>, DomainError> {
        let mut records: Vec<PaymentRecord> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.transaction_id == transaction_id)
            .cloned())
    }
}
