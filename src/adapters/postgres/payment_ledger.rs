//! PostgreSQL implementation of PaymentLedger.
//!
//! Append-only. The unique index on `transaction_id` makes redelivered
//! payments a no-op (`ON CONFLICT DO NOTHING`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{PaymentRecord, PaymentStatus};
use crate::domain::foundation::{DomainError, PaymentRecordId, Timestamp, UserId};
use crate::ports::{AppendResult, PaymentLedger};

pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRecordRow {
    id: Uuid,
    subscription_ref: Option<String>,
    user_id: String,
    amount: i64,
    currency: String,
    transaction_id: String,
    invoice_id: Option<String>,
    status: String,
    is_renewal: bool,
    failure_reason: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<PaymentRecordRow> for PaymentRecord {
    type Error = DomainError;

    fn try_from(row: PaymentRecordRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord {
            id: PaymentRecordId::from_uuid(row.id),
            subscription_ref: row.subscription_ref,
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::database(format!("Invalid user_id in ledger: {}", e)))?,
            amount: row.amount,
            currency: row.currency,
            transaction_id: row.transaction_id,
            invoice_id: row.invoice_id,
            status: PaymentStatus::parse(&row.status).ok_or_else(|| {
                DomainError::database(format!("Invalid payment status: {}", row.status))
            })?,
            is_renewal: row.is_renewal,
            failure_reason: row.failure_reason,
            timestamp: Timestamp::from_datetime(row.occurred_at),
        })
    }
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn append(&self, record: &PaymentRecord) -> Result<AppendResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_records (
                id, subscription_ref, user_id, amount, currency, transaction_id,
                invoice_id, status, is_renewal, failure_reason, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.subscription_ref)
        .bind(record.user_id.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.transaction_id)
        .bind(&record.invoice_id)
        .bind(record.status.as_str())
        .bind(record.is_renewal)
        .bind(&record.failure_reason)
        .bind(record.timestamp.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to append payment record: {}", e)))?;

        Ok(if result.rows_affected() == 0 {
            AppendResult::Duplicate
        } else {
            AppendResult::Inserted
        })
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentRecord>, DomainError> {
        let rows: Vec<PaymentRecordRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_ref, user_id, amount, currency, transaction_id,
                   invoice_id, status, is_renewal, failure_reason, occurred_at
            FROM payment_records
            WHERE user_id = $1
            ORDER BY occurred_at DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list payment records: {}", e)))?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        let row: Option<PaymentRecordRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_ref, user_id, amount, currency, transaction_id,
                   invoice_id, status, is_renewal, failure_reason, occurred_at
            FROM payment_records
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find payment record: {}", e)))?;

        row.map(PaymentRecord::try_from).transpose()
    }
}
