//! Subscription status vocabulary and lifecycle state machine.
//!
//! The stored record carries `status` + `cancelationType`; the lifecycle
//! state is derived from those two fields and the period end.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{StateMachine, Timestamp};

/// Stored subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SubscriptionStatus::Active),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cancellation takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancelationType {
    #[default]
    None,
    Immediate,
    EndOfPeriod,
}

impl CancelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelationType::None => "none",
            CancelationType::Immediate => "immediate",
            CancelationType::EndOfPeriod => "end_of_period",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(CancelationType::None),
            "immediate" => Some(CancelationType::Immediate),
            "end_of_period" => Some(CancelationType::EndOfPeriod),
            _ => None,
        }
    }
}

/// Refund progress on the current subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    None,
    Requested,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::None => "none",
            RefundStatus::Requested => "requested",
            RefundStatus::Processed => "processed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(RefundStatus::None),
            "requested" => Some(RefundStatus::Requested),
            "processed" => Some(RefundStatus::Processed),
            _ => None,
        }
    }
}

/// Status as the gateway reports it on a subscription object.
///
/// Unknown strings are kept so they can be logged and mapped conservatively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    Other(String),
}

impl ProviderStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => ProviderStatus::Active,
            "trialing" => ProviderStatus::Trialing,
            "past_due" => ProviderStatus::PastDue,
            "unpaid" => ProviderStatus::Unpaid,
            "canceled" => ProviderStatus::Canceled,
            "incomplete" => ProviderStatus::Incomplete,
            "incomplete_expired" => ProviderStatus::IncompleteExpired,
            "paused" => ProviderStatus::Paused,
            other => ProviderStatus::Other(other.to_string()),
        }
    }

    /// True when the gateway considers the subscription paid up.
    pub fn is_active(&self) -> bool {
        matches!(self, ProviderStatus::Active | ProviderStatus::Trialing)
    }

    /// Local status for a non-active provider status.
    pub fn to_local(&self) -> SubscriptionStatus {
        match self {
            ProviderStatus::Active | ProviderStatus::Trialing => SubscriptionStatus::Active,
            ProviderStatus::PastDue | ProviderStatus::Unpaid => SubscriptionStatus::PastDue,
            ProviderStatus::Canceled | ProviderStatus::IncompleteExpired => {
                SubscriptionStatus::Canceled
            }
            ProviderStatus::Incomplete | ProviderStatus::Paused | ProviderStatus::Other(_) => {
                SubscriptionStatus::Incomplete
            }
        }
    }
}

/// Lifecycle position of a user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    None,
    Active,
    CancelPending,
    PastDue,
    Incomplete,
    Canceled,
}

impl LifecycleState {
    /// Human-readable name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::None => "missing",
            LifecycleState::Active => "active",
            LifecycleState::CancelPending => "pending cancellation",
            LifecycleState::PastDue => "past due",
            LifecycleState::Incomplete => "incomplete",
            LifecycleState::Canceled => "canceled",
        }
    }

    /// Derives the lifecycle state from stored fields at `now`.
    pub fn derive(
        status: SubscriptionStatus,
        cancelation: CancelationType,
        end_date: Timestamp,
        now: Timestamp,
    ) -> Self {
        match status {
            SubscriptionStatus::Active => LifecycleState::Active,
            SubscriptionStatus::PastDue => LifecycleState::PastDue,
            SubscriptionStatus::Incomplete => LifecycleState::Incomplete,
            SubscriptionStatus::Canceled => {
                if cancelation == CancelationType::EndOfPeriod && now.is_before(&end_date) {
                    LifecycleState::CancelPending
                } else {
                    LifecycleState::Canceled
                }
            }
        }
    }
}

impl StateMachine for LifecycleState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, target),
            (None, Active)
                | (Active, Active)
                | (Active, CancelPending)
                | (Active, PastDue)
                | (Active, Incomplete)
                | (Active, Canceled)
                | (CancelPending, CancelPending)
                | (CancelPending, Active)
                | (CancelPending, Canceled)
                | (PastDue, PastDue)
                | (PastDue, Active)
                | (PastDue, Incomplete)
                | (PastDue, Canceled)
                | (Incomplete, Incomplete)
                | (Incomplete, Active)
                | (Incomplete, PastDue)
                | (Incomplete, Canceled)
                // A fresh checkout starts a new subscription
                | (Canceled, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use LifecycleState::*;
        match self {
            None => vec![Active],
            Active => vec![Active, CancelPending, PastDue, Incomplete, Canceled],
            CancelPending => vec![CancelPending, Active, Canceled],
            PastDue => vec![PastDue, Active, Incomplete, Canceled],
            Incomplete => vec![Incomplete, Active, PastDue, Canceled],
            Canceled => vec![Active],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    #[test]
    fn cancel_pending_before_end_date() {
        let state = LifecycleState::derive(
            SubscriptionStatus::Canceled,
            CancelationType::EndOfPeriod,
            now().add_days(5),
            now(),
        );
        assert_eq!(state, LifecycleState::CancelPending);
    }

    #[test]
    fn end_of_period_cancellation_becomes_canceled_at_end_date() {
        let state = LifecycleState::derive(
            SubscriptionStatus::Canceled,
            CancelationType::EndOfPeriod,
            now(),
            now(),
        );
        assert_eq!(state, LifecycleState::Canceled);
    }

    #[test]
    fn immediate_cancellation_is_canceled() {
        let state = LifecycleState::derive(
            SubscriptionStatus::Canceled,
            CancelationType::Immediate,
            now().add_days(20),
            now(),
        );
        assert_eq!(state, LifecycleState::Canceled);
    }

    #[test]
    fn reactivation_and_recovery_are_legal() {
        assert!(LifecycleState::CancelPending.can_transition_to(&LifecycleState::Active));
        assert!(LifecycleState::PastDue.can_transition_to(&LifecycleState::Active));
    }

    #[test]
    fn none_can_only_become_active() {
        assert_eq!(LifecycleState::None.valid_transitions(), vec![LifecycleState::Active]);
        assert!(!LifecycleState::None.can_transition_to(&LifecycleState::CancelPending));
    }

    #[test]
    fn canceled_cannot_be_reactivated_as_cancel_pending() {
        assert!(!LifecycleState::Canceled.can_transition_to(&LifecycleState::CancelPending));
        assert!(LifecycleState::Canceled.transition_to(LifecycleState::PastDue).is_err());
    }

    #[test]
    fn table_is_consistent_with_valid_transitions() {
        use LifecycleState::*;
        for state in [None, Active, CancelPending, PastDue, Incomplete, Canceled] {
            for target in state.valid_transitions() {
                assert!(state.can_transition_to(&target), "{:?} -> {:?}", state, target);
            }
        }
    }

    #[test]
    fn provider_status_maps_to_local_status() {
        assert_eq!(ProviderStatus::parse("unpaid").to_local(), SubscriptionStatus::PastDue);
        assert_eq!(
            ProviderStatus::parse("incomplete_expired").to_local(),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            ProviderStatus::parse("something_new").to_local(),
            SubscriptionStatus::Incomplete
        );
        assert!(ProviderStatus::parse("trialing").is_active());
    }

    #[test]
    fn stored_enums_round_trip_through_strings() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Incomplete,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            CancelationType::parse("end_of_period"),
            Some(CancelationType::EndOfPeriod)
        );
        assert_eq!(RefundStatus::parse("processed"), Some(RefundStatus::Processed));
    }
}
