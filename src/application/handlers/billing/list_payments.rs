//! ListPaymentsHandler - Query handler for the caller's payment history.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PaymentRecord};
use crate::domain::foundation::UserId;
use crate::ports::PaymentLedger;

#[derive(Debug, Clone)]
pub struct ListPaymentsQuery {
    pub user_id: UserId,
}

pub struct ListPaymentsHandler {
    ledger: Arc<dyn PaymentLedger>,
}

impl ListPaymentsHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { ledger }
    }

    /// Ledger entries for the user, newest first. Empty when there are none.
    pub async fn handle(&self, query: ListPaymentsQuery) -> Result<Vec<PaymentRecord>, BillingError> {
        Ok(self.ledger.list_for_user(&query.user_id).await?)
    }
}
