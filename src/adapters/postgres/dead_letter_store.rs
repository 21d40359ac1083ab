//! PostgreSQL implementation of DeadLetterStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DeadLetterId, DomainError, ErrorCode, Timestamp};
use crate::ports::{DeadLetterEntry, DeadLetterStore};

pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    event_id: String,
    event_type: String,
    payload: serde_json::Value,
    error_kind: String,
    error: String,
    attempts: i32,
    failed_at: DateTime<Utc>,
    replayed_at: Option<DateTime<Utc>>,
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetterEntry {
            id: DeadLetterId::from_uuid(row.id),
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            error_kind: row.error_kind,
            error: row.error,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            failed_at: Timestamp::from_datetime(row.failed_at),
            replayed_at: row.replayed_at.map(Timestamp::from_datetime),
        }
    }
}

fn not_found(id: &DeadLetterId) -> DomainError {
    DomainError::new(
        ErrorCode::DeadLetterNotFound,
        format!("Dead letter {} not found", id),
    )
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn record(&self, entry: &DeadLetterEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                id, event_id, event_type, payload, error_kind, error, attempts, failed_at, replayed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.event_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(&entry.error_kind)
        .bind(&entry.error)
        .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
        .bind(entry.failed_at.as_datetime())
        .bind(entry.replayed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record dead letter: {}", e)))?;
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, payload, error_kind, error, attempts, failed_at, replayed_at
            FROM dead_letters
            WHERE replayed_at IS NULL
            ORDER BY failed_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list dead letters: {}", e)))?;

        Ok(rows.into_iter().map(DeadLetterEntry::from).collect())
    }

    async fn mark_replayed(&self, id: &DeadLetterId, at: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE dead_letters SET replayed_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to mark dead letter: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: &DeadLetterId,
        error: &str,
        _at: Timestamp,
    ) -> Result<(), DomainError> {
        // failed_at keeps the first failure so replay order stays stable
        let result = sqlx::query(
            "UPDATE dead_letters SET attempts = attempts + 1, error = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update dead letter: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
