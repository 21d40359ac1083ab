//! Subscription plan catalog.
//!
//! Plans are a closed set. Each one fixes its billing cadence, list price
//! and refund window; nothing about a plan is read from configuration
//! except the gateway price id it maps to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::errors::BillingError;
use crate::domain::foundation::Timestamp;

/// Billing period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Monthly,
    Annual,
}

impl Cadence {
    /// End of a period that starts at `start`.
    pub fn period_end(&self, start: Timestamp) -> Timestamp {
        match self {
            Cadence::Monthly => start.add_calendar_months(1),
            Cadence::Annual => start.add_calendar_years(1),
        }
    }
}

/// Subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Standard access, billed monthly.
    Monthly,
    /// Standard access, billed yearly.
    Annual,
    /// Premium tier, billed monthly.
    Premium,
    /// Premium tier, billed yearly.
    PremiumAnnual,
}

impl Plan {
    pub const ALL: [Plan; 4] = [
        Plan::Monthly,
        Plan::Annual,
        Plan::Premium,
        Plan::PremiumAnnual,
    ];

    pub fn cadence(&self) -> Cadence {
        match self {
            Plan::Monthly | Plan::Premium => Cadence::Monthly,
            Plan::Annual | Plan::PremiumAnnual => Cadence::Annual,
        }
    }

    /// Price per billing period in cents (USD).
    pub fn price_cents(&self) -> i64 {
        match self {
            Plan::Monthly => 999,
            Plan::Annual => 9_999,
            Plan::Premium => 1_999,
            Plan::PremiumAnnual => 19_999,
        }
    }

    pub fn currency(&self) -> &'static str {
        "usd"
    }

    /// Days after `startDate` during which a refund may be requested.
    pub fn refund_window_days(&self) -> i64 {
        match self.cadence() {
            Cadence::Monthly => 7,
            Cadence::Annual => 14,
        }
    }

    pub fn is_premium_tier(&self) -> bool {
        matches!(self, Plan::Premium | Plan::PremiumAnnual)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Annual => "annual",
            Plan::Premium => "premium",
            Plan::PremiumAnnual => "premium_annual",
        }
    }

    /// Parses a plan name, failing with `InvalidPlan` for anything outside the catalog.
    pub fn parse(value: &str) -> Result<Self, BillingError> {
        value.parse()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Plan {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Plan::ALL
            .into_iter()
            .find(|plan| plan.as_str() == normalized)
            .ok_or_else(|| BillingError::invalid_plan(s))
    }
}

/// Two-way mapping between plans and gateway price ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceCatalog {
    prices: HashMap<Plan, String>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, plan: Plan, price_id: impl Into<String>) -> Self {
        self.prices.insert(plan, price_id.into());
        self
    }

    pub fn price_for(&self, plan: Plan) -> Option<&str> {
        self.prices.get(&plan).map(String::as_str)
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.prices
            .iter()
            .find(|(_, id)| id.as_str() == price_id)
            .map(|(plan, _)| *plan)
    }

    /// Plans with no configured price id.
    pub fn missing_plans(&self) -> Vec<Plan> {
        Plan::ALL
            .into_iter()
            .filter(|plan| !self.prices.contains_key(plan))
            .collect()
    }
}
