//! PostgreSQL implementation of SubscriptionRepository.
//!
//! `merge` runs read → merge → write in one transaction that first takes a
//! per-user advisory lock, so concurrent webhook deliveries and API calls
//! for the same user serialize while different users proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    BillingError, CancelationType, Plan, RefundStatus, Subscription, SubscriptionChange,
    SubscriptionStatus,
};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{MergeOutcome, SubscriptionRepository};

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, external_customer_id, external_subscription_id, plan, status,
           is_active, cancelation_type, start_date, end_date, payment_method,
           last_payment_date, last_transaction_id, refund_status, refund_amount,
           refund_date, refund_reason, last_event_id, last_event_at, created_at, updated_at
    FROM subscriptions
"#;

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    external_customer_id: String,
    external_subscription_id: Option<String>,
    plan: String,
    status: String,
    is_active: bool,
    cancelation_type: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    payment_method: Option<String>,
    last_payment_date: Option<DateTime<Utc>>,
    last_transaction_id: Option<String>,
    refund_status: String,
    refund_amount: Option<i64>,
    refund_date: Option<DateTime<Utc>>,
    refund_reason: Option<String>,
    last_event_id: Option<String>,
    last_event_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(corrupt("user_id"))?,
            external_customer_id: CustomerId::new(row.external_customer_id)
                .map_err(corrupt("external_customer_id"))?,
            external_subscription_id: row.external_subscription_id,
            plan: Plan::parse(&row.plan).map_err(corrupt("plan"))?,
            status: SubscriptionStatus::parse(&row.status)
                .ok_or_else(|| invalid_column("status", &row.status))?,
            is_active: row.is_active,
            cancelation_type: CancelationType::parse(&row.cancelation_type)
                .ok_or_else(|| invalid_column("cancelation_type", &row.cancelation_type))?,
            start_date: Timestamp::from_datetime(row.start_date),
            end_date: Timestamp::from_datetime(row.end_date),
            payment_method: row.payment_method,
            last_payment_date: row.last_payment_date.map(Timestamp::from_datetime),
            last_transaction_id: row.last_transaction_id,
            refund_status: RefundStatus::parse(&row.refund_status)
                .ok_or_else(|| invalid_column("refund_status", &row.refund_status))?,
            refund_amount: row.refund_amount,
            refund_date: row.refund_date.map(Timestamp::from_datetime),
            refund_reason: row.refund_reason,
            last_event_id: row.last_event_id,
            last_event_at: row.last_event_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn corrupt<E: std::fmt::Display>(column: &'static str) -> impl Fn(E) -> DomainError {
    move |e| DomainError::database(format!("Invalid {} in subscriptions row: {}", column, e))
}

fn invalid_column(column: &str, value: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}

fn infrastructure(context: &str) -> impl Fn(sqlx::Error) -> BillingError + '_ {
    move |e| BillingError::infrastructure(format!("{}: {}", context, e))
}

async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    sub: &Subscription,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, user_id, external_customer_id, external_subscription_id, plan, status,
            is_active, cancelation_type, start_date, end_date, payment_method,
            last_payment_date, last_transaction_id, refund_status, refund_amount,
            refund_date, refund_reason, last_event_id, last_event_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
        ON CONFLICT (user_id) DO UPDATE SET
            id = EXCLUDED.id,
            external_customer_id = EXCLUDED.external_customer_id,
            external_subscription_id = EXCLUDED.external_subscription_id,
            plan = EXCLUDED.plan,
            status = EXCLUDED.status,
            is_active = EXCLUDED.is_active,
            cancelation_type = EXCLUDED.cancelation_type,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date,
            payment_method = EXCLUDED.payment_method,
            last_payment_date = EXCLUDED.last_payment_date,
            last_transaction_id = EXCLUDED.last_transaction_id,
            refund_status = EXCLUDED.refund_status,
            refund_amount = EXCLUDED.refund_amount,
            refund_date = EXCLUDED.refund_date,
            refund_reason = EXCLUDED.refund_reason,
            last_event_id = EXCLUDED.last_event_id,
            last_event_at = EXCLUDED.last_event_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.user_id.as_str())
    .bind(sub.external_customer_id.as_str())
    .bind(&sub.external_subscription_id)
    .bind(sub.plan.as_str())
    .bind(sub.status.as_str())
    .bind(sub.is_active)
    .bind(sub.cancelation_type.as_str())
    .bind(sub.start_date.as_datetime())
    .bind(sub.end_date.as_datetime())
    .bind(&sub.payment_method)
    .bind(sub.last_payment_date.map(|t| *t.as_datetime()))
    .bind(&sub.last_transaction_id)
    .bind(sub.refund_status.as_str())
    .bind(sub.refund_amount)
    .bind(sub.refund_date.map(|t| *t.as_datetime()))
    .bind(&sub.refund_reason)
    .bind(&sub.last_event_id)
    .bind(sub.last_event_at.map(|t| *t.as_datetime()))
    .bind(sub.created_at.as_datetime())
    .bind(sub.updated_at.as_datetime())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_COLUMNS))
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn merge(
        &self,
        user_id: &UserId,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<MergeOutcome, BillingError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(infrastructure("Failed to begin transaction"))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(infrastructure("Failed to lock subscription"))?;

        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_COLUMNS))
                .bind(user_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(infrastructure("Failed to load subscription"))?;
        let current = row.map(Subscription::try_from).transpose()?;

        // A rejected change drops `tx`, which rolls back and releases the lock
        let outcome = MergeOutcome::resolve(user_id, current, change, now)?;

        if let MergeOutcome::Applied { current, .. } = &outcome {
            upsert(&mut tx, current)
                .await
                .map_err(infrastructure("Failed to save subscription"))?;
        }

        tx.commit()
            .await
            .map_err(infrastructure("Failed to commit subscription"))?;

        Ok(outcome)
    }

    async fn find_expired_cancellations(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE is_active
              AND status = 'canceled'
              AND cancelation_type = 'end_of_period'
              AND end_date <= $1
            ORDER BY end_date ASC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to find expired cancellations: {}", e))
        })?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
