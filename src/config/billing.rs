//! Billing runtime knobs

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Time allowed to apply a verified webhook before it is dead-lettered
    #[serde(default = "default_webhook_budget")]
    pub webhook_budget_ms: u64,

    /// Interval between expiry sweeps; 0 disables the sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Subscriptions expired per sweep
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: u32,
}

impl BillingConfig {
    pub fn webhook_budget(&self) -> Duration {
        Duration::from_millis(self.webhook_budget_ms)
    }

    /// `None` when the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(100..=30_000).contains(&self.webhook_budget_ms) {
            return Err(ValidationError::OutOfRange {
                field: "billing.webhook_budget_ms",
                min: 100,
                max: 30_000,
            });
        }
        if !(1..=10_000).contains(&self.sweep_batch_size) {
            return Err(ValidationError::OutOfRange {
                field: "billing.sweep_batch_size",
                min: 1,
                max: 10_000,
            });
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_budget_ms: default_webhook_budget(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch(),
        }
    }
}

fn default_webhook_budget() -> u64 {
    5_000
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_sweep_batch() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BillingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.webhook_budget(), Duration::from_secs(5));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_interval_disables_sweep() {
        let config = BillingConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn budget_bounds() {
        let config = BillingConfig {
            webhook_budget_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
