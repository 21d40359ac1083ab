use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::EntitlementLevel;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, UserId};
use crate::ports::UserDirectory;

/// Customer links and entitlement levels, with a log of every push.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    customers: RwLock<HashMap<CustomerId, UserId>>,
    entitlements: RwLock<HashMap<UserId, EntitlementLevel>>,
    pushes: RwLock<Vec<(UserId, EntitlementLevel)>>,
    unavailable: AtomicBool,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_customer(self, customer_id: &str, user_id: &str) -> Self {
        if let (Ok(customer), Ok(user)) = (CustomerId::new(customer_id), UserId::new(user_id)) {
            self.customers.write().await.insert(customer, user);
        }
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entitlement(&self, user_id: &UserId) -> Option<EntitlementLevel> {
        self.entitlements.read().await.get(user_id).copied()
    }

    /// Every `set_entitlement` call, in order.
    pub async fn pushes(&self) -> Vec<(UserId, EntitlementLevel)> {
        self.pushes.read().await.clone()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DomainError::new(
                ErrorCode::DirectoryError,
                "user directory unavailable",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user_id_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<UserId>, DomainError> {
        self.check_available()?;
        Ok(self.customers.read().await.get(customer_id).cloned())
    }

    async fn link_customer(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError> {
        self.check_available()?;
        self.customers
            .write()
            .await
            .insert(customer_id.clone(), user_id.clone());
        Ok(())
    }

    async fn set_entitlement(
        &self,
        user_id: &UserId,
        level: EntitlementLevel,
    ) -> Result<(), DomainError> {
        self.check_available()?;
        self.entitlements
            .write()
            .await
            .insert(user_id.clone(), level);
        self.pushes.write().await.push((user_id.clone(), level));
        Ok(())
    }
}
