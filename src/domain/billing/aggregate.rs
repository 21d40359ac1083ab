//! Subscription aggregate and its merge rules.
//!
//! Every mutation is expressed as a [`SubscriptionChange`]. Repositories
//! load the current record, call [`Subscription::merge`] and persist the
//! result in one atomic step, so the rules here are the only place the
//! record changes.

use serde::{Deserialize, Serialize};

use super::errors::BillingError;
use super::plan::Plan;
use super::refund::{evaluate_refund, RefundEligibility};
use super::status::{
    CancelationType, LifecycleState, ProviderStatus, RefundStatus, SubscriptionStatus,
};
use crate::domain::foundation::{CustomerId, SubscriptionId, Timestamp, UserId};

/// The authoritative subscription record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub external_customer_id: CustomerId,
    pub external_subscription_id: Option<String>,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub is_active: bool,
    pub cancelation_type: CancelationType,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub payment_method: Option<String>,
    pub last_payment_date: Option<Timestamp>,
    pub last_transaction_id: Option<String>,
    pub refund_status: RefundStatus,
    pub refund_amount: Option<i64>,
    pub refund_date: Option<Timestamp>,
    pub refund_reason: Option<String>,
    /// Id of the last gateway event applied to this record.
    pub last_event_id: Option<String>,
    /// `created` time of the last gateway event applied to this record.
    pub last_event_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Identity and creation time of a gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStamp {
    pub id: String,
    pub created: Timestamp,
}

impl EventStamp {
    pub fn new(id: impl Into<String>, created: Timestamp) -> Self {
        Self {
            id: id.into(),
            created,
        }
    }
}

/// Data carried by a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutActivation {
    pub customer_id: CustomerId,
    pub subscription_id: Option<String>,
    pub plan: Plan,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub event: EventStamp,
}

/// Absolute subscription fields as the gateway reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSnapshot {
    pub subscription_id: String,
    pub status: ProviderStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<Timestamp>,
    pub plan: Option<Plan>,
    pub event: EventStamp,
}

/// A requested mutation of a user's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Checkout(CheckoutActivation),
    ProviderSnapshot(ProviderSnapshot),
    ProviderDeleted {
        subscription_id: String,
        event: EventStamp,
    },
    PaymentRecorded {
        transaction_id: String,
        paid_at: Timestamp,
        payment_method: Option<String>,
    },
    ScheduleCancel,
    Reactivate,
    PlanChanged {
        plan: Plan,
        end_date: Timestamp,
    },
    RefundRequested,
    RefundProcessed {
        amount: i64,
        reason: String,
    },
    RefundFailed,
    ExpireCancellation,
}

impl SubscriptionChange {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionChange::Checkout(_) => "checkout",
            SubscriptionChange::ProviderSnapshot(_) => "provider_snapshot",
            SubscriptionChange::ProviderDeleted { .. } => "provider_deleted",
            SubscriptionChange::PaymentRecorded { .. } => "payment_recorded",
            SubscriptionChange::ScheduleCancel => "cancel",
            SubscriptionChange::Reactivate => "reactivate",
            SubscriptionChange::PlanChanged { .. } => "change plan",
            SubscriptionChange::RefundRequested => "refund",
            SubscriptionChange::RefundProcessed { .. } => "complete refund",
            SubscriptionChange::RefundFailed => "roll back refund",
            SubscriptionChange::ExpireCancellation => "expire",
        }
    }
}

/// Why a merge left the record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same gateway event already applied.
    Duplicate,
    /// Event is older than the last applied one.
    Stale,
    /// Event refers to a subscription other than the stored one.
    ForeignSubscription,
    /// Subscription was deleted at the gateway; only a new checkout revives the user.
    Terminated,
    /// No record exists for the user.
    NoSubscription,
    /// Checkout for a subscription that is already recorded.
    AlreadyApplied,
    /// Nothing to do yet (e.g. period not over).
    NotDue,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate_event",
            SkipReason::Stale => "stale_event",
            SkipReason::ForeignSubscription => "foreign_subscription",
            SkipReason::Terminated => "subscription_terminated",
            SkipReason::NoSubscription => "no_subscription",
            SkipReason::AlreadyApplied => "already_applied",
            SkipReason::NotDue => "not_due",
        }
    }
}

/// Outcome of [`Subscription::merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    Write(Box<Subscription>),
    Skip(SkipReason),
}

impl Subscription {
    /// Access rule: active, or canceled at period end and still inside the period.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        match self.status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Canceled => {
                self.cancelation_type == CancelationType::EndOfPeriod
                    && now.is_before(&self.end_date)
            }
            SubscriptionStatus::PastDue | SubscriptionStatus::Incomplete => false,
        }
    }

    pub fn lifecycle(&self, now: Timestamp) -> LifecycleState {
        LifecycleState::derive(self.status, self.cancelation_type, self.end_date, now)
    }

    /// True while the user holds a subscription that blocks a new checkout.
    pub fn is_live(&self, now: Timestamp) -> bool {
        matches!(
            self.lifecycle(now),
            LifecycleState::Active | LifecycleState::CancelPending | LifecycleState::PastDue
        )
    }

    pub fn refund_eligibility(&self, now: Timestamp) -> RefundEligibility {
        evaluate_refund(
            self.status,
            self.refund_status,
            self.plan,
            self.start_date,
            now,
        )
    }

    /// Applies `change` to `current` for `user_id`.
    ///
    /// Gateway-driven changes that cannot apply are skipped; subscriber-driven
    /// changes that cannot apply are errors.
    pub fn merge(
        user_id: &UserId,
        current: Option<&Subscription>,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<MergeDecision, BillingError> {
        match change {
            SubscriptionChange::Checkout(activation) => {
                Ok(Self::merge_checkout(user_id, current, activation, now))
            }
            SubscriptionChange::ProviderSnapshot(snapshot) => {
                let Some(current) = current else {
                    return Ok(MergeDecision::Skip(SkipReason::NoSubscription));
                };
                Ok(current.merge_snapshot(snapshot, now))
            }
            SubscriptionChange::ProviderDeleted {
                subscription_id,
                event,
            } => {
                let Some(current) = current else {
                    return Ok(MergeDecision::Skip(SkipReason::NoSubscription));
                };
                Ok(current.merge_deleted(subscription_id, event, now))
            }
            SubscriptionChange::PaymentRecorded {
                transaction_id,
                paid_at,
                payment_method,
            } => {
                let Some(current) = current else {
                    return Ok(MergeDecision::Skip(SkipReason::NoSubscription));
                };
                if current.last_transaction_id.as_deref() == Some(transaction_id.as_str())
                    && payment_method.is_none()
                {
                    return Ok(MergeDecision::Skip(SkipReason::AlreadyApplied));
                }
                let mut next = current.clone();
                if next.last_payment_date.map_or(true, |last| !paid_at.is_before(&last)) {
                    next.last_payment_date = Some(*paid_at);
                    next.last_transaction_id = Some(transaction_id.clone());
                }
                if payment_method.is_some() {
                    next.payment_method = payment_method.clone();
                }
                next.updated_at = now;
                Ok(MergeDecision::Write(Box::new(next)))
            }
            SubscriptionChange::ExpireCancellation => {
                let Some(current) = current else {
                    return Ok(MergeDecision::Skip(SkipReason::NoSubscription));
                };
                if !current.is_active || current.is_active_at(now) {
                    return Ok(MergeDecision::Skip(SkipReason::NotDue));
                }
                let mut next = current.clone();
                next.is_active = false;
                next.updated_at = now;
                Ok(MergeDecision::Write(Box::new(next)))
            }
            subscriber_change => {
                let current =
                    current.ok_or_else(|| BillingError::not_found_for_user(user_id.clone()))?;
                current
                    .merge_subscriber_change(subscriber_change, now)
                    .map(|next| MergeDecision::Write(Box::new(next)))
            }
        }
    }

    fn merge_checkout(
        user_id: &UserId,
        current: Option<&Subscription>,
        activation: &CheckoutActivation,
        now: Timestamp,
    ) -> MergeDecision {
        if let Some(current) = current {
            if let Some(reason) = current.event_guard(&activation.event) {
                return MergeDecision::Skip(reason);
            }
            if activation.subscription_id.is_some()
                && current.external_subscription_id == activation.subscription_id
            {
                return MergeDecision::Skip(SkipReason::AlreadyApplied);
            }
        }

        let (id, created_at) = current
            .map(|c| (c.id, c.created_at))
            .unwrap_or_else(|| (SubscriptionId::new(), now));

        MergeDecision::Write(Box::new(Subscription {
            id,
            user_id: user_id.clone(),
            external_customer_id: activation.customer_id.clone(),
            external_subscription_id: activation.subscription_id.clone(),
            plan: activation.plan,
            status: SubscriptionStatus::Active,
            is_active: true,
            cancelation_type: CancelationType::None,
            start_date: now,
            end_date: activation.plan.cadence().period_end(now),
            payment_method: activation.payment_method.clone(),
            last_payment_date: activation.transaction_id.as_ref().map(|_| now),
            last_transaction_id: activation.transaction_id.clone(),
            refund_status: RefundStatus::None,
            refund_amount: None,
            refund_date: None,
            refund_reason: None,
            last_event_id: Some(activation.event.id.clone()),
            last_event_at: Some(activation.event.created),
            created_at,
            updated_at: now,
        }))
    }

    fn merge_snapshot(&self, snapshot: &ProviderSnapshot, now: Timestamp) -> MergeDecision {
        if let Some(reason) = self.subscription_guard(&snapshot.subscription_id, &snapshot.event) {
            return MergeDecision::Skip(reason);
        }

        let mut next = self.clone();
        if let Some(period_end) = snapshot.current_period_end {
            next.end_date = period_end;
        }
        if let Some(plan) = snapshot.plan {
            next.plan = plan;
        }

        if snapshot.cancel_at_period_end {
            next.status = SubscriptionStatus::Canceled;
            next.cancelation_type = CancelationType::EndOfPeriod;
        } else if snapshot.status.is_active() {
            next.status = SubscriptionStatus::Active;
            next.cancelation_type = CancelationType::None;
        } else {
            next.status = snapshot.status.to_local();
            next.cancelation_type = if next.status == SubscriptionStatus::Canceled {
                CancelationType::Immediate
            } else {
                CancelationType::None
            };
        }
        next.is_active = next.is_active_at(now);
        next.stamp(&snapshot.event, now);
        MergeDecision::Write(Box::new(next))
    }

    fn merge_deleted(
        &self,
        subscription_id: &str,
        event: &EventStamp,
        now: Timestamp,
    ) -> MergeDecision {
        if let Some(reason) = self.subscription_guard(subscription_id, event) {
            return MergeDecision::Skip(reason);
        }

        let mut next = self.clone();
        next.status = SubscriptionStatus::Canceled;
        next.cancelation_type = CancelationType::Immediate;
        next.is_active = false;
        next.stamp(event, now);
        MergeDecision::Write(Box::new(next))
    }

    fn merge_subscriber_change(
        &self,
        change: &SubscriptionChange,
        now: Timestamp,
    ) -> Result<Subscription, BillingError> {
        let state = self.lifecycle(now);
        let mut next = self.clone();

        match change {
            SubscriptionChange::ScheduleCancel => {
                self.require(state, LifecycleState::Active, change)?;
                next.status = SubscriptionStatus::Canceled;
                next.cancelation_type = CancelationType::EndOfPeriod;
            }
            SubscriptionChange::Reactivate => {
                self.require(state, LifecycleState::CancelPending, change)?;
                next.status = SubscriptionStatus::Active;
                next.cancelation_type = CancelationType::None;
            }
            SubscriptionChange::PlanChanged { plan, end_date } => {
                self.require(state, LifecycleState::Active, change)?;
                if *plan == self.plan {
                    return Err(BillingError::validation(
                        "newPlan",
                        format!("already on the {} plan", plan),
                    ));
                }
                next.plan = *plan;
                next.end_date = *end_date;
            }
            SubscriptionChange::RefundRequested => {
                let eligibility = self.refund_eligibility(now);
                if !eligibility.eligible {
                    return Err(BillingError::refund_not_allowed(
                        eligibility.reason.unwrap_or_else(|| "refund not allowed".into()),
                    ));
                }
                next.refund_status = RefundStatus::Requested;
            }
            SubscriptionChange::RefundProcessed { amount, reason } => {
                if self.refund_status != RefundStatus::Requested {
                    return Err(BillingError::invalid_state(
                        format!("refund {}", self.refund_status.as_str()),
                        change.name(),
                    ));
                }
                next.refund_status = RefundStatus::Processed;
                next.refund_amount = Some(*amount);
                next.refund_date = Some(now);
                next.refund_reason = Some(reason.clone());
                next.status = SubscriptionStatus::Canceled;
                next.cancelation_type = CancelationType::Immediate;
            }
            SubscriptionChange::RefundFailed => {
                if self.refund_status == RefundStatus::Requested {
                    next.refund_status = RefundStatus::None;
                }
            }
            other => {
                return Err(BillingError::invalid_state(
                    state.label(),
                    other.name(),
                ))
            }
        }

        next.is_active = next.is_active_at(now);
        next.updated_at = now;
        Ok(next)
    }

    fn require(
        &self,
        state: LifecycleState,
        expected: LifecycleState,
        change: &SubscriptionChange,
    ) -> Result<(), BillingError> {
        if state == expected {
            Ok(())
        } else {
            Err(BillingError::invalid_state(
                state.label(),
                change.name(),
            ))
        }
    }

    /// Ordering guard shared by every gateway event.
    fn event_guard(&self, event: &EventStamp) -> Option<SkipReason> {
        if self.last_event_id.as_deref() == Some(event.id.as_str()) {
            return Some(SkipReason::Duplicate);
        }
        match self.last_event_at {
            Some(last) if event.created.is_before(&last) => Some(SkipReason::Stale),
            _ => None,
        }
    }

    /// Guard for events that target a specific gateway subscription.
    fn subscription_guard(&self, subscription_id: &str, event: &EventStamp) -> Option<SkipReason> {
        if let Some(reason) = self.event_guard(event) {
            return Some(reason);
        }
        if self.external_subscription_id.as_deref() != Some(subscription_id) {
            return Some(SkipReason::ForeignSubscription);
        }
        if self.status == SubscriptionStatus::Canceled
            && self.cancelation_type == CancelationType::Immediate
        {
            return Some(SkipReason::Terminated);
        }
        None
    }

    fn stamp(&mut self, event: &EventStamp, now: Timestamp) {
        self.last_event_id = Some(event.id.clone());
        self.last_event_at = Some(event.created);
        self.updated_at = now;
    }
}
