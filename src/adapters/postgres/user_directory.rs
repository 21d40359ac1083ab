//! PostgreSQL implementation of UserDirectory.
//!
//! Keeps the gateway customer → user mapping and the last entitlement level
//! pushed for each user.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::EntitlementLevel;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, UserId};
use crate::ports::UserDirectory;

pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn directory_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DirectoryError, format!("{}: {}", context, e))
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn user_id_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<UserId>, DomainError> {
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM customer_mappings WHERE customer_id = $1")
                .bind(customer_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(directory_error("Failed to resolve customer"))?;

        user_id
            .map(|id| {
                UserId::new(id).map_err(|e| {
                    DomainError::database(format!("Invalid user_id in customer mapping: {}", e))
                })
            })
            .transpose()
    }

    async fn link_customer(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO customer_mappings (customer_id, user_id, linked_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (customer_id) DO UPDATE SET user_id = EXCLUDED.user_id
            "#,
        )
        .bind(customer_id.as_str())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(directory_error("Failed to link customer"))?;
        Ok(())
    }

    async fn set_entitlement(
        &self,
        user_id: &UserId,
        level: EntitlementLevel,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_entitlements (user_id, level, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET level = EXCLUDED.level, updated_at = NOW()
            "#,
        )
        .bind(user_id.as_str())
        .bind(level.as_str())
        .execute(&self.pool)
        .await
        .map_err(directory_error("Failed to set entitlement"))?;
        Ok(())
    }
}
