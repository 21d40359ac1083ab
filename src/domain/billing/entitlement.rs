//! Entitlement levels and the transition rule that decides when to push them.

use serde::{Deserialize, Serialize};

/// Access level held in the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementLevel {
    Free,
    Premium,
}

impl EntitlementLevel {
    pub fn from_active(is_active: bool) -> Self {
        if is_active {
            EntitlementLevel::Premium
        } else {
            EntitlementLevel::Free
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementLevel::Free => "free",
            EntitlementLevel::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(EntitlementLevel::Free),
            "premium" => Some(EntitlementLevel::Premium),
            _ => None,
        }
    }
}

/// What, if anything, must be pushed to the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChange {
    Grant,
    Revoke,
    Unchanged,
}

impl EntitlementChange {
    /// Compares stored `isActive` before and after a merge.
    ///
    /// `previous` is `None` when no record existed.
    pub fn between(previous: Option<bool>, current: bool) -> Self {
        match (previous.unwrap_or(false), current) {
            (false, true) => EntitlementChange::Grant,
            (true, false) => EntitlementChange::Revoke,
            _ => EntitlementChange::Unchanged,
        }
    }

    pub fn level(&self) -> Option<EntitlementLevel> {
        match self {
            EntitlementChange::Grant => Some(EntitlementLevel::Premium),
            EntitlementChange::Revoke => Some(EntitlementLevel::Free),
            EntitlementChange::Unchanged => None,
        }
    }
}
