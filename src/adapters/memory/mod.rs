//! In-memory adapters.
//!
//! Used by tests and by local runs without a database. Each store keeps its
//! state behind a `tokio::sync::RwLock`; the subscription repository holds
//! the write lock across read, merge and write so merges are serialized.

mod dead_letter_store;
mod payment_ledger;
mod subscription_repository;
mod user_directory;

pub use dead_letter_store::InMemoryDeadLetterStore;
pub use payment_ledger::InMemoryPaymentLedger;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use user_directory::InMemoryUserDirectory;
