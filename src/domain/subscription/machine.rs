//! Pure subscription transitions.
//!
//! Every function takes the current subscription value, the current time,
//! and whatever outcome drove the change, and returns the next value plus
//! exactly one event. Nothing here performs I/O; persisting the result and
//! publishing the event is the caller's job.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{Plan, Price};
use crate::domain::error::BillingError;
use crate::domain::foundation::{InvoiceId, StateMachine, Timestamp};

use super::{
    CancelReason, PendingPlanChange, Subscription, SubscriptionEvent, SubscriptionEventKind,
    SubscriptionStatus,
};

/// Dunning and trial behavior the machine applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DunningPolicy {
    /// Day offsets from `past_due_since` for each retry.
    pub retry_intervals: Vec<u32>,
    pub grace_period_days: u32,
    pub auto_convert_trials: bool,
}

impl Default for DunningPolicy {
    fn default() -> Self {
        Self {
            retry_intervals: vec![1, 3, 5],
            grace_period_days: 7,
            auto_convert_trials: true,
        }
    }
}

impl DunningPolicy {
    /// Retry time for the `attempt`-th failure, counted from `since`.
    fn retry_at(&self, since: Timestamp, attempt: u32) -> Option<Timestamp> {
        let index = usize::try_from(attempt).ok()?.checked_sub(1)?;
        self.retry_intervals
            .get(index)
            .map(|days| since.add_days(i64::from(*days)))
    }

    fn exhausted(&self, attempt: u32) -> bool {
        usize::try_from(attempt).map_or(true, |n| n >= self.retry_intervals.len())
    }
}

/// What the lifecycle processor must do for a due subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    ConvertTrial,
    EndTrial,
    Renew,
    CancelAtPeriodEnd,
    RetryPayment,
    FinalCollection,
}

impl LifecycleAction {
    /// True if the action collects money.
    pub fn charges(&self) -> bool {
        !matches!(
            self,
            LifecycleAction::EndTrial | LifecycleAction::CancelAtPeriodEnd
        )
    }

    /// Purpose label mixed into the payment idempotency key.
    pub fn purpose(&self) -> &'static str {
        match self {
            LifecycleAction::ConvertTrial => "trial_conversion",
            LifecycleAction::EndTrial => "trial_end",
            LifecycleAction::Renew => "renewal",
            LifecycleAction::CancelAtPeriodEnd => "period_end_cancel",
            LifecycleAction::RetryPayment => "retry",
            LifecycleAction::FinalCollection => "final_collection",
        }
    }

    /// Label mixed into the payment idempotency key.
    ///
    /// Every collection attempt on one dunning state shares a label, so a
    /// scheduled retry, a final collection and a customer-initiated retry
    /// for the same `(period_start, retry_count)` charge at most once.
    pub fn key_purpose(&self) -> &'static str {
        match self {
            LifecycleAction::RetryPayment | LifecycleAction::FinalCollection => DUNNING_COLLECTION,
            other => other.purpose(),
        }
    }
}

/// Idempotency label shared by every collection attempt while dunning.
pub const DUNNING_COLLECTION: &str = "collection";

/// Result of a definitive payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Collected `amount` (after credit) and recorded it on `invoice_id`.
    Succeeded { amount: i64, invoice_id: InvoiceId },
    Declined { code: String, message: String },
}

/// Amount owed at renewal after applying credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalCharge {
    pub gross: i64,
    pub credit_applied: i64,
    pub amount: i64,
}

/// Next subscription value and the event describing the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub subscription: Subscription,
    pub event: SubscriptionEvent,
}

fn transition(
    mut subscription: Subscription,
    now: Timestamp,
    kind: SubscriptionEventKind,
) -> Transition {
    subscription.updated_at = now;
    let event = SubscriptionEvent::new(
        subscription.id,
        subscription.customer_id.clone(),
        now,
        kind,
    );
    Transition {
        subscription,
        event,
    }
}

fn move_to(
    subscription: &mut Subscription,
    target: SubscriptionStatus,
    attempted: &str,
) -> Result<(), BillingError> {
    subscription.status = subscription
        .status
        .transition_to(target)
        .map_err(|_| BillingError::invalid_state(subscription.status, attempted))?;
    Ok(())
}

/// Decides what, if anything, is due for `subscription` at `now`.
pub fn next_action(
    subscription: &Subscription,
    now: Timestamp,
    policy: &DunningPolicy,
) -> Option<LifecycleAction> {
    if !subscription.is_due(now) {
        return None;
    }
    match subscription.status {
        SubscriptionStatus::Trialing => {
            if subscription.cancel_at_period_end || !policy.auto_convert_trials {
                Some(LifecycleAction::EndTrial)
            } else {
                Some(LifecycleAction::ConvertTrial)
            }
        }
        SubscriptionStatus::Active => {
            if subscription.cancel_at_period_end {
                Some(LifecycleAction::CancelAtPeriodEnd)
            } else {
                Some(LifecycleAction::Renew)
            }
        }
        SubscriptionStatus::PastDue => Some(LifecycleAction::RetryPayment),
        SubscriptionStatus::GracePeriod => match subscription.grace_period_ends_at {
            Some(ends) if now >= ends => Some(LifecycleAction::FinalCollection),
            _ => Some(LifecycleAction::RetryPayment),
        },
        SubscriptionStatus::Paused
        | SubscriptionStatus::Canceled
        | SubscriptionStatus::CanceledNonpayment => None,
    }
}

/// Amount to collect for the subscription's next period on `price`.
pub fn renewal_charge(subscription: &Subscription, price: &Price) -> RenewalCharge {
    let gross = price.unit_amount();
    let credit_applied = subscription.credit_balance.clamp(0, gross);
    RenewalCharge {
        gross,
        credit_applied,
        amount: gross - credit_applied,
    }
}

/// Applies a definitive charge outcome for a charging `action`.
///
/// `price` is the price being collected, after any pending plan change has
/// been applied to `subscription`.
pub fn resolve_charge(
    subscription: &Subscription,
    action: LifecycleAction,
    outcome: &ChargeOutcome,
    price: &Price,
    policy: &DunningPolicy,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    if !action.charges() {
        return Err(BillingError::invalid_state(
            subscription.status,
            action.purpose(),
        ));
    }
    match outcome {
        ChargeOutcome::Succeeded { amount, invoice_id } => {
            charge_succeeded(subscription, action, *amount, *invoice_id, price, now)
        }
        ChargeOutcome::Declined { code, .. } => {
            charge_declined(subscription, action, code, policy, now)
        }
    }
}

fn charge_succeeded(
    subscription: &Subscription,
    action: LifecycleAction,
    amount: i64,
    invoice_id: InvoiceId,
    price: &Price,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    let mut next = subscription.clone();
    let was_dunning = next.status.is_dunning();
    move_to(&mut next, SubscriptionStatus::Active, action.purpose())?;

    let period_start = subscription.current_period_end;
    let period_end = price.period_end_from(period_start)?;
    let credit = renewal_charge(subscription, price);

    next.current_period_start = period_start;
    next.current_period_end = period_end;
    next.credit_balance -= credit.credit_applied;
    next.clear_dunning();

    let kind = if was_dunning {
        SubscriptionEventKind::PaymentRecovered {
            period_start,
            period_end,
            amount,
            invoice_id,
        }
    } else if action == LifecycleAction::ConvertTrial {
        SubscriptionEventKind::TrialConverted {
            period_start,
            period_end,
            amount,
            invoice_id,
        }
    } else {
        SubscriptionEventKind::Renewed {
            period_start,
            period_end,
            amount,
            invoice_id,
        }
    };
    Ok(transition(next, now, kind))
}

fn charge_declined(
    subscription: &Subscription,
    action: LifecycleAction,
    failure_code: &str,
    policy: &DunningPolicy,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    let mut next = subscription.clone();
    let attempt = subscription.retry_count.saturating_add(1);
    let failure_code = failure_code.to_string();

    if action == LifecycleAction::FinalCollection {
        move_to(&mut next, SubscriptionStatus::CanceledNonpayment, action.purpose())?;
        next.retry_count = attempt;
        next.next_retry_at = None;
        next.grace_period_ends_at = None;
        next.canceled_at = Some(now);
        return Ok(transition(
            next,
            now,
            SubscriptionEventKind::CanceledNonpayment {
                attempt,
                failure_code,
            },
        ));
    }

    if subscription.status == SubscriptionStatus::GracePeriod {
        move_to(&mut next, SubscriptionStatus::GracePeriod, action.purpose())?;
        next.retry_count = attempt;
        next.next_retry_at = None;
        return Ok(transition(
            next,
            now,
            SubscriptionEventKind::RenewalFailed {
                attempt,
                failure_code,
                next_retry_at: None,
            },
        ));
    }

    let since = subscription.past_due_since.unwrap_or(now);
    next.retry_count = attempt;
    next.past_due_since = Some(since);

    if policy.exhausted(attempt) {
        move_to(&mut next, SubscriptionStatus::GracePeriod, action.purpose())?;
        let ends = now.add_days(i64::from(policy.grace_period_days));
        let retry = policy
            .retry_at(since, attempt)
            .filter(|at| at.is_before(&ends) && at.is_after(&now));
        next.grace_period_ends_at = Some(ends);
        next.next_retry_at = retry;
        return Ok(transition(
            next,
            now,
            SubscriptionEventKind::GracePeriodStarted {
                attempt,
                failure_code,
                grace_period_ends_at: ends,
                next_retry_at: retry,
            },
        ));
    }

    move_to(&mut next, SubscriptionStatus::PastDue, action.purpose())?;
    let retry = policy.retry_at(since, attempt);
    next.next_retry_at = retry;
    Ok(transition(
        next,
        now,
        SubscriptionEventKind::RenewalFailed {
            attempt,
            failure_code,
            next_retry_at: retry,
        },
    ))
}

/// Trial ended without converting.
pub fn end_trial(subscription: &Subscription, now: Timestamp) -> Result<Transition, BillingError> {
    if subscription.status != SubscriptionStatus::Trialing {
        return Err(BillingError::invalid_state(subscription.status, "end trial"));
    }
    cancel_with_reason(subscription, CancelReason::TrialEnded, now)
}

/// A scheduled cancellation reached period end.
pub fn cancel_at_period_end(
    subscription: &Subscription,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    if !subscription.cancel_at_period_end {
        return Err(BillingError::invalid_state(
            subscription.status,
            "cancel at period end",
        ));
    }
    cancel_with_reason(subscription, CancelReason::PeriodEnd, now)
}

fn cancel_with_reason(
    subscription: &Subscription,
    reason: CancelReason,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    let mut next = subscription.clone();
    move_to(&mut next, SubscriptionStatus::Canceled, "cancel")?;
    next.canceled_at = Some(now);
    next.next_retry_at = None;
    next.grace_period_ends_at = None;
    next.pending_plan_change = None;
    Ok(transition(next, now, SubscriptionEventKind::Canceled { reason }))
}

/// Customer cancellation, now or at period end.
pub fn cancel(
    subscription: &Subscription,
    at_period_end: bool,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    if !at_period_end {
        return cancel_with_reason(subscription, CancelReason::Voluntary, now);
    }
    let schedulable = matches!(
        subscription.status,
        SubscriptionStatus::Trialing | SubscriptionStatus::Active
    );
    if !schedulable || subscription.cancel_at_period_end {
        return Err(BillingError::invalid_state(
            subscription.status,
            "schedule cancellation for",
        ));
    }
    let mut next = subscription.clone();
    next.cancel_at_period_end = true;
    let effective_at = next.current_period_end;
    Ok(transition(
        next,
        now,
        SubscriptionEventKind::CancelScheduled { effective_at },
    ))
}

/// Withdraws a scheduled cancellation.
pub fn reactivate(subscription: &Subscription, now: Timestamp) -> Result<Transition, BillingError> {
    if subscription.is_terminal() || !subscription.cancel_at_period_end {
        return Err(BillingError::invalid_state(subscription.status, "reactivate"));
    }
    let mut next = subscription.clone();
    next.cancel_at_period_end = false;
    Ok(transition(next, now, SubscriptionEventKind::Reactivated))
}

pub fn pause(subscription: &Subscription, now: Timestamp) -> Result<Transition, BillingError> {
    if subscription.status != SubscriptionStatus::Active {
        return Err(BillingError::invalid_state(subscription.status, "pause"));
    }
    let mut next = subscription.clone();
    move_to(&mut next, SubscriptionStatus::Paused, "pause")?;
    next.paused_at = Some(now);
    Ok(transition(next, now, SubscriptionEventKind::Paused))
}

/// Resumes a paused subscription on its existing period dates.
///
/// A period that ended while paused is renewed on the next processing pass.
pub fn resume(subscription: &Subscription, now: Timestamp) -> Result<Transition, BillingError> {
    if subscription.status != SubscriptionStatus::Paused {
        return Err(BillingError::invalid_state(subscription.status, "resume"));
    }
    let mut next = subscription.clone();
    move_to(&mut next, SubscriptionStatus::Active, "resume")?;
    next.paused_at = None;
    Ok(transition(next, now, SubscriptionEventKind::Resumed))
}

fn ensure_plan_changeable(subscription: &Subscription) -> Result<(), BillingError> {
    match subscription.status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => Ok(()),
        status => Err(BillingError::invalid_state(status, "change plan of")),
    }
}

/// Stores a plan change for the next renewal.
pub fn schedule_plan_change(
    subscription: &Subscription,
    new_plan: &Plan,
    new_price: &Price,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    ensure_plan_changeable(subscription)?;
    let mut next = subscription.clone();
    let effective_at = next.current_period_end;
    next.pending_plan_change = Some(PendingPlanChange {
        new_plan_id: new_plan.id.clone(),
        new_price_id: new_price.id.clone(),
        apply_at: effective_at,
    });
    Ok(transition(
        next,
        now,
        SubscriptionEventKind::PlanChangeScheduled {
            to_plan_id: new_plan.id.clone(),
            to_price_id: new_price.id.clone(),
            effective_at,
        },
    ))
}

/// Switches plan and price now.
///
/// A negative `net_amount` is added to `credit_balance`; a positive one must
/// already have been collected on `invoice_id`.
pub fn change_plan_now(
    subscription: &Subscription,
    new_plan: &Plan,
    new_price: &Price,
    net_amount: i64,
    invoice_id: Option<InvoiceId>,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    ensure_plan_changeable(subscription)?;
    let mut next = subscription.clone();
    next.plan_id = new_plan.id.clone();
    next.price_id = new_price.id.clone();
    next.pending_plan_change = None;
    if net_amount < 0 {
        next.credit_balance = next.credit_balance.saturating_add(-net_amount);
    }
    Ok(transition(
        next,
        now,
        SubscriptionEventKind::PlanChanged {
            from_plan_id: subscription.plan_id.clone(),
            from_price_id: subscription.price_id.clone(),
            to_plan_id: new_plan.id.clone(),
            to_price_id: new_price.id.clone(),
            net_amount,
            invoice_id,
        },
    ))
}

/// Books a collected payment that no transition can record as account credit.
///
/// Used when the subscription changed status while the charge was in flight,
/// so the payment is kept on the subscription instead of being lost.
pub fn credit_payment(
    subscription: &Subscription,
    amount: i64,
    invoice_id: InvoiceId,
    now: Timestamp,
) -> Result<Transition, BillingError> {
    if amount <= 0 {
        return Err(BillingError::validation(
            "amount",
            "only a positive payment can be credited",
        ));
    }
    let mut next = subscription.clone();
    next.credit_balance = next.credit_balance.saturating_add(amount);
    Ok(transition(
        next,
        now,
        SubscriptionEventKind::PaymentCredited { amount, invoice_id },
    ))
}
