//! Payment gateway configuration (Stripe)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::domain::billing::{Plan, PriceCatalog};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: SecretString,

    /// Webhook signing secret
    pub stripe_webhook_secret: SecretString,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Gateway price ids, one per plan
    pub price_monthly: Option<String>,
    pub price_annual: Option<String>,
    pub price_premium: Option<String>,
    pub price_premium_annual: Option<String>,

    /// Where hosted checkout sends the customer afterwards
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,

    /// Per-call client timeout in milliseconds. Calls are never retried.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accepted age of a webhook signature timestamp, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

impl PaymentConfig {
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Catalog built from whichever price ids are configured.
    pub fn price_catalog(&self) -> PriceCatalog {
        [
            (Plan::Monthly, &self.price_monthly),
            (Plan::Annual, &self.price_annual),
            (Plan::Premium, &self.price_premium),
            (Plan::PremiumAnnual, &self.price_premium_annual),
        ]
        .into_iter()
        .filter_map(|(plan, price)| price.as_ref().map(|id| (plan, id)))
        .fold(PriceCatalog::new(), |catalog, (plan, id)| {
            catalog.with_price(plan, id.clone())
        })
    }

    /// Secrets are always required. Key prefixes and a complete price
    /// catalog are only enforced in production.
    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();
        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if !(100..=30_000).contains(&self.timeout_ms) {
            return Err(ValidationError::OutOfRange {
                field: "payment.timeout_ms",
                min: 100,
                max: 30_000,
            });
        }

        if environment == Environment::Production {
            if !api_key.starts_with("sk_") {
                return Err(ValidationError::InvalidStripeKey);
            }
            if !webhook_secret.starts_with("whsec_") {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
            if let Some(plan) = self.price_catalog().missing_plans().first() {
                return Err(ValidationError::MissingPrice(plan.as_str()));
            }
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_success_url() -> String {
    "http://localhost:5173/billing/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:5173/billing/cancel".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_webhook_tolerance() -> i64 {
    300
}
