//! Application configuration
//!
//! Loaded from environment variables with the `config` and `dotenvy` crates.
//! Variables use the `SUBSCRIPTION_BILLING` prefix and `__` between nested
//! keys.
//!
//! # Example
//!
//! ```no_run
//! use subscription_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod auth;
mod billing;
mod database;
mod error;
mod payment;
mod server;

pub use auth::AuthConfig;
pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Stripe credentials, price ids, redirect URLs
    pub payment: PaymentConfig,

    /// Session token validation
    pub auth: AuthConfig,

    /// Webhook budget and expiry sweep
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present
    /// 2. Reads variables with the `SUBSCRIPTION_BILLING` prefix
    /// 3. Splits nested keys on `__`
    ///
    /// - `SUBSCRIPTION_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SUBSCRIPTION_BILLING__PAYMENT__PRICE_MONTHLY=price_...` -> `payment.price_monthly`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SUBSCRIPTION_BILLING")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let environment = self.server.environment;
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(environment)?;
        self.auth.validate(environment)?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [(&str, &str); 4] = [
        ("SUBSCRIPTION_BILLING__DATABASE__URL", "postgresql://test@localhost/billing"),
        ("SUBSCRIPTION_BILLING__PAYMENT__STRIPE_API_KEY", "sk_test_xxx"),
        ("SUBSCRIPTION_BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx"),
        ("SUBSCRIPTION_BILLING__AUTH__JWT_SECRET", "dev-secret"),
    ];

    const OPTIONAL: [&str; 5] = [
        "SUBSCRIPTION_BILLING__SERVER__PORT",
        "SUBSCRIPTION_BILLING__SERVER__ENVIRONMENT",
        "SUBSCRIPTION_BILLING__BILLING__WEBHOOK_BUDGET_MS",
        "SUBSCRIPTION_BILLING__PAYMENT__PRICE_MONTHLY",
        "SUBSCRIPTION_BILLING__DATABASE__RUN_MIGRATIONS",
    ];

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        for (key, value) in VARS.iter().chain(extra) {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        for (key, _) in VARS {
            env::remove_var(key);
        }
        for key in OPTIONAL {
            env::remove_var(key);
        }
        result
    }

    #[test]
    fn loads_minimal_environment_with_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();

        assert_eq!(config.database.url, "postgresql://test@localhost/billing");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.billing.webhook_budget_ms, 5_000);
        assert!(!config.database.run_migrations);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_overrides_are_read() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[
            ("SUBSCRIPTION_BILLING__SERVER__PORT", "3000"),
            ("SUBSCRIPTION_BILLING__BILLING__WEBHOOK_BUDGET_MS", "2500"),
            ("SUBSCRIPTION_BILLING__PAYMENT__PRICE_MONTHLY", "price_123"),
            ("SUBSCRIPTION_BILLING__DATABASE__RUN_MIGRATIONS", "true"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.billing.webhook_budget_ms, 2500);
        assert_eq!(config.payment.price_monthly.as_deref(), Some("price_123"));
        assert!(config.database.run_migrations);
    }

    #[test]
    fn production_rejects_development_secrets() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("SUBSCRIPTION_BILLING__SERVER__ENVIRONMENT", "production")]).unwrap();

        assert!(config.is_production());
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_database_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::remove_var("SUBSCRIPTION_BILLING__DATABASE__URL");
        assert!(AppConfig::load().is_err());
    }
}
