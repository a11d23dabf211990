//! Subscription aggregate entity.
//!
//! # Design Decisions
//!
//! - **Money in minor units**: `credit_balance` is i64 cents in the price currency
//! - **Never deleted**: subscriptions end in a terminal status and stay on record
//! - **Optimistic concurrency**: `version` changes on every stored write

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{
    AddOnId, CustomerId, PlanId, PriceId, SubscriptionId, Timestamp, ValidationError,
};

use super::SubscriptionStatus;

/// Plan change waiting for the next renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlanChange {
    pub new_plan_id: PlanId,
    pub new_price_id: PriceId,
    /// Period end at which the change takes effect.
    pub apply_at: Timestamp,
}

/// Subscription aggregate - one customer's recurring agreement on one price.
///
/// # Invariants
///
/// - `current_period_end > current_period_start`
/// - `grace_period_ends_at` is set iff `status == GracePeriod`
/// - `past_due_since` and `next_retry_at` are only set while dunning
/// - `credit_balance >= 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub price_id: PriceId,
    pub status: SubscriptionStatus,

    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub trial_end: Option<Timestamp>,

    /// Consecutive failed collection attempts for the current period.
    pub retry_count: u32,
    pub past_due_since: Option<Timestamp>,
    pub next_retry_at: Option<Timestamp>,
    pub grace_period_ends_at: Option<Timestamp>,

    pub pending_plan_change: Option<PendingPlanChange>,
    pub add_on_ids: Vec<AddOnId>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub paused_at: Option<Timestamp>,

    /// Credit from downgrades, consumed by later charges.
    pub credit_balance: i64,
    pub metadata: BTreeMap<String, String>,

    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates a subscription in its free trial.
    ///
    /// The trial occupies the first period, which ends at `trial_end`.
    pub fn new_trialing(
        id: SubscriptionId,
        customer_id: CustomerId,
        plan_id: PlanId,
        price_id: PriceId,
        now: Timestamp,
        trial_end: Timestamp,
    ) -> Result<Self, ValidationError> {
        let mut subscription = Self::new_active(id, customer_id, plan_id, price_id, now, trial_end)?;
        subscription.status = SubscriptionStatus::Trialing;
        subscription.trial_end = Some(trial_end);
        Ok(subscription)
    }

    /// Creates a subscription whose first period has been paid.
    pub fn new_active(
        id: SubscriptionId,
        customer_id: CustomerId,
        plan_id: PlanId,
        price_id: PriceId,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> Result<Self, ValidationError> {
        if !period_end.is_after(&period_start) {
            return Err(ValidationError::invalid_format(
                "current_period_end",
                "period end must be after period start",
            ));
        }
        Ok(Self {
            id,
            customer_id,
            plan_id,
            price_id,
            status: SubscriptionStatus::Active,
            current_period_start: period_start,
            current_period_end: period_end,
            trial_end: None,
            retry_count: 0,
            past_due_since: None,
            next_retry_at: None,
            grace_period_ends_at: None,
            pending_plan_change: None,
            add_on_ids: Vec::new(),
            cancel_at_period_end: false,
            canceled_at: None,
            paused_at: None,
            credit_balance: 0,
            metadata: BTreeMap::new(),
            version: 0,
            created_at: period_start,
            updated_at: period_start,
        })
    }

    pub fn with_add_ons(mut self, add_on_ids: Vec<AddOnId>) -> Self {
        self.add_on_ids = add_on_ids;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// When the lifecycle processor next needs to look at this subscription.
    ///
    /// `None` for paused and terminal subscriptions, which are never due.
    pub fn next_action_at(&self) -> Option<Timestamp> {
        match self.status {
            SubscriptionStatus::Trialing => {
                Some(self.trial_end.unwrap_or(self.current_period_end))
            }
            SubscriptionStatus::Active => Some(self.current_period_end),
            SubscriptionStatus::PastDue => self.next_retry_at,
            SubscriptionStatus::GracePeriod => match (self.next_retry_at, self.grace_period_ends_at) {
                (Some(retry), Some(ends)) => Some(retry.min(ends)),
                (retry, ends) => retry.or(ends),
            },
            SubscriptionStatus::Paused
            | SubscriptionStatus::Canceled
            | SubscriptionStatus::CanceledNonpayment => None,
        }
    }

    /// True if the processor has work to do at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_action_at().is_some_and(|at| at <= now)
    }

    pub fn is_terminal(&self) -> bool {
        use crate::domain::foundation::StateMachine;
        self.status.is_terminal()
    }

    /// Replaces plan and price with the pending change, if any.
    ///
    /// Returns true when a change was applied.
    pub fn apply_pending_plan_change(&mut self) -> bool {
        match self.pending_plan_change.take() {
            Some(change) => {
                self.plan_id = change.new_plan_id;
                self.price_id = change.new_price_id;
                true
            }
            None => false,
        }
    }

    /// Clears all dunning bookkeeping.
    pub(crate) fn clear_dunning(&mut self) {
        self.retry_count = 0;
        self.past_due_since = None;
        self.next_retry_at = None;
        self.grace_period_ends_at = None;
    }
}
