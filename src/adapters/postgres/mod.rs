//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - Subscription records with per-user advisory locking
//! - `PostgresPaymentLedger` - Append-only billing ledger
//! - `PostgresUserDirectory` - Customer mapping and entitlement levels
//! - `PostgresDeadLetterStore` - Parked notifications for replay
//!
//! Schema lives in `migrations/` and is applied with `sqlx::migrate!`.

mod dead_letter_store;
mod payment_ledger;
mod subscription_repository;
mod user_directory;

pub use dead_letter_store::PostgresDeadLetterStore;
pub use payment_ledger::PostgresPaymentLedger;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use user_directory::PostgresUserDirectory;
