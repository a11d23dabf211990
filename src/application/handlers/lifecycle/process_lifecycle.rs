//! ProcessLifecycleHandler - Advances every due subscription one step.
//!
//! Safe to run repeatedly and concurrently: payment keys are derived from
//! subscription state, and each write is a compare-and-swap on the version
//! that was read. A lost race is counted as a conflict and picked up again
//! by the next run.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::BillingContext;
use crate::domain::catalog::Price;
use crate::domain::foundation::{EventMetadata, SubscriptionId, Timestamp};
use crate::domain::invoice::{Invoice, InvoicePaid, LineItem, LineItemKind};
use crate::domain::subscription::machine;
use crate::domain::subscription::{
    ChargeOutcome, DunningPolicy, LifecycleAction, Subscription, SubscriptionEventKind, Transition,
};
use crate::domain::BillingError;
use crate::ports::IdempotencyKey;

use super::super::shared::{self, Charge, Collected, Collection, Recorded};

/// Counts from one `process_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Successful charges: renewals, trial conversions and recoveries.
    pub renewed: usize,
    /// Retry and final-collection attempts, whatever their result.
    pub retried: usize,
    /// Subscriptions that entered the grace period.
    pub grace: usize,
    /// Transitions to `canceled` or `canceled_nonpayment`.
    pub canceled: usize,
    /// Payments the processor has not settled yet.
    pub pending: usize,
    /// Writes lost to a concurrent run.
    pub conflicts: usize,
    /// Items that failed without changing state.
    pub failures: usize,
    pub errors: Vec<(SubscriptionId, BillingError)>,
}

impl ProcessSummary {
    fn record(&mut self, action: LifecycleAction, kind: &SubscriptionEventKind) {
        if matches!(
            action,
            LifecycleAction::RetryPayment | LifecycleAction::FinalCollection
        ) {
            self.retried += 1;
        }
        match kind {
            SubscriptionEventKind::TrialConverted { .. }
            | SubscriptionEventKind::Renewed { .. }
            | SubscriptionEventKind::PaymentRecovered { .. } => self.renewed += 1,
            SubscriptionEventKind::GracePeriodStarted { .. } => self.grace += 1,
            SubscriptionEventKind::Canceled { .. }
            | SubscriptionEventKind::CanceledNonpayment { .. } => self.canceled += 1,
            _ => {}
        }
    }
}

enum ItemOutcome {
    Idle,
    Pending,
    Committed {
        action: LifecycleAction,
        kind: SubscriptionEventKind,
    },
}

struct Charged {
    transition: Transition,
    key: IdempotencyKey,
    invoice: Option<Invoice>,
    price: Price,
    /// A scheduled plan change was applied before charging.
    applied_change: bool,
    /// Amount actually taken from the customer.
    collected: i64,
}

/// Handler for the scheduled lifecycle run.
pub struct ProcessLifecycleHandler {
    ctx: BillingContext,
}

impl ProcessLifecycleHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    /// Processes up to `batch_size` due subscriptions.
    ///
    /// Per-item failures are counted in the summary; only failing to load
    /// the batch is returned as an error.
    pub async fn process_all(&self) -> Result<ProcessSummary, BillingError> {
        let now = self.ctx.clock.now();
        let run_id = Uuid::new_v4().to_string();
        let policy = self.ctx.config.dunning_policy();

        let due = self
            .ctx
            .subscriptions
            .find_due(now, self.ctx.config.batch_size)
            .await
            .map_err(BillingError::from_storage)?;
        info!(run_id = %run_id, due = due.len(), "processing due subscriptions");

        let mut summary = ProcessSummary::default();
        for subscription in due {
            let subscription_id = subscription.id;
            match self.process_one(subscription, &policy, now, &run_id).await {
                Ok(ItemOutcome::Idle) => {}
                Ok(ItemOutcome::Pending) => summary.pending += 1,
                Ok(ItemOutcome::Committed { action, kind }) => summary.record(action, &kind),
                Err(BillingError::ConcurrencyConflict { .. }) => {
                    warn!(
                        subscription_id = %subscription_id,
                        "subscription changed concurrently, skipping until next run"
                    );
                    summary.conflicts += 1;
                }
                Err(err) => {
                    warn!(subscription_id = %subscription_id, %err, "failed to process subscription");
                    summary.failures += 1;
                    summary.errors.push((subscription_id, err));
                }
            }
        }

        info!(
            run_id = %run_id,
            renewed = summary.renewed,
            retried = summary.retried,
            grace = summary.grace,
            canceled = summary.canceled,
            pending = summary.pending,
            conflicts = summary.conflicts,
            failures = summary.failures,
            "lifecycle run finished"
        );
        Ok(summary)
    }

    async fn process_one(
        &self,
        subscription: Subscription,
        policy: &DunningPolicy,
        now: Timestamp,
        run_id: &str,
    ) -> Result<ItemOutcome, BillingError> {
        let Some(action) = machine::next_action(&subscription, now, policy) else {
            debug!(subscription_id = %subscription.id, "nothing due");
            return Ok(ItemOutcome::Idle);
        };
        debug!(
            subscription_id = %subscription.id,
            action = action.purpose(),
            status = %subscription.status,
            "subscription due"
        );

        let mut metadata = EventMetadata {
            correlation_id: Some(run_id.to_string()),
            idempotency_key: None,
        };

        let charged = match action {
            LifecycleAction::EndTrial | LifecycleAction::CancelAtPeriodEnd => None,
            LifecycleAction::ConvertTrial
            | LifecycleAction::Renew
            | LifecycleAction::RetryPayment
            | LifecycleAction::FinalCollection => {
                match self.charge(&subscription, action, policy, now).await? {
                    Some(charged) => Some(charged),
                    None => return Ok(ItemOutcome::Pending),
                }
            }
        };

        let (transition, invoice) = match &charged {
            None if action == LifecycleAction::EndTrial => {
                (machine::end_trial(&subscription, now)?, None)
            }
            None => (machine::cancel_at_period_end(&subscription, now)?, None),
            Some(charged) => {
                metadata.idempotency_key = Some(charged.key.as_str().to_string());
                (charged.transition.clone(), charged.invoice.clone())
            }
        };

        let mut kind = transition.event.kind.clone();
        let committed =
            shared::commit(&self.ctx, subscription.version, transition, metadata.clone()).await;
        let stored = match (committed, &charged, &invoice) {
            (Ok(stored), _, _) => stored,
            (Err(BillingError::ConcurrencyConflict { .. }), Some(charged), Some(invoice))
                if charged.collected > 0 =>
            {
                let collected = Collected {
                    charged_from: &subscription,
                    amount: charged.collected,
                    invoice_id: invoice.id,
                };
                let outcome = ChargeOutcome::Succeeded {
                    amount: charged.collected,
                    invoice_id: invoice.id,
                };
                let replay = |fresh: &Subscription| {
                    let mut base = fresh.clone();
                    if charged.applied_change {
                        if fresh.pending_plan_change != subscription.pending_plan_change {
                            return Err(BillingError::invalid_state(
                                fresh.status,
                                "apply a rescheduled plan change to",
                            ));
                        }
                        base.apply_pending_plan_change();
                    }
                    machine::resolve_charge(&base, action, &outcome, &charged.price, policy, now)
                };
                match shared::record_collected(&self.ctx, collected, metadata.clone(), now, replay)
                    .await?
                {
                    Recorded::Committed {
                        subscription: stored,
                        kind: recorded,
                    } => {
                        kind = recorded;
                        stored
                    }
                    Recorded::AlreadyRecorded(_) => {
                        return Err(BillingError::conflict(subscription.id))
                    }
                }
            }
            (Err(err), _, _) => return Err(err),
        };
        info!(
            subscription_id = %stored.id,
            action = action.purpose(),
            event_type = kind.event_type(),
            status = %stored.status,
            "subscription transitioned"
        );

        if let Some(invoice) = invoice {
            let paid = InvoicePaid::for_invoice(&invoice, now);
            shared::publish(self.ctx.events.as_ref(), &paid, metadata).await;
        }

        Ok(ItemOutcome::Committed { action, kind })
    }

    /// Collects the amount due for a charging action.
    ///
    /// Returns `None` while the payment is pending.
    async fn charge(
        &self,
        subscription: &Subscription,
        action: LifecycleAction,
        policy: &DunningPolicy,
        now: Timestamp,
    ) -> Result<Option<Charged>, BillingError> {
        let mut working = subscription.clone();
        let applied_change = matches!(
            action,
            LifecycleAction::Renew | LifecycleAction::ConvertTrial
        ) && working.apply_pending_plan_change();
        if applied_change {
            debug!(
                subscription_id = %working.id,
                plan_id = %working.plan_id,
                price_id = %working.price_id,
                "applying scheduled plan change"
            );
        }

        let price = shared::load_price(&self.ctx, &working.price_id).await?;
        let due = machine::renewal_charge(&working, &price);
        let key = IdempotencyKey::for_subscription(
            action.key_purpose(),
            &working.id,
            working.current_period_start,
            working.retry_count,
        );

        let collection = shared::collect(
            self.ctx.payments.as_ref(),
            Charge {
                customer_id: &working.customer_id,
                amount: due.amount,
                currency: &price.currency,
                idempotency_key: &key,
                description: format!("{} for subscription {}", action.purpose(), working.id),
                metadata: BTreeMap::from([
                    ("subscription_id".to_string(), working.id.to_string()),
                    ("action".to_string(), action.purpose().to_string()),
                ]),
            },
        )
        .await?;

        let mut collected = 0;
        let (outcome, invoice) = match collection {
            Collection::Pending => {
                info!(
                    subscription_id = %working.id,
                    idempotency_key = %key,
                    "payment pending, leaving subscription unchanged"
                );
                return Ok(None);
            }
            Collection::Paid { payment_id, amount } => {
                let mut lines = vec![LineItem::new(
                    format!("{} (every {} {})", price.id, price.interval_count(), price.interval),
                    due.gross,
                    LineItemKind::Subscription,
                )];
                if due.credit_applied > 0 {
                    lines.push(LineItem::new(
                        "Account credit",
                        -due.credit_applied,
                        LineItemKind::ProrationCredit,
                    ));
                }
                let invoice = shared::open_invoice(
                    &key,
                    &working.customer_id,
                    &price.currency,
                    Some(working.id),
                    lines,
                    Vec::new(),
                    now,
                )?;
                let invoice = shared::settle_invoice(&self.ctx, invoice, payment_id, now).await?;
                collected = amount;
                let outcome = ChargeOutcome::Succeeded {
                    amount,
                    invoice_id: invoice.id,
                };
                (outcome, Some(invoice))
            }
            Collection::Declined { code, message } => {
                info!(
                    subscription_id = %working.id,
                    decline_code = %code,
                    attempt = working.retry_count + 1,
                    "payment declined"
                );
                (ChargeOutcome::Declined { code, message }, None)
            }
        };

        let transition = machine::resolve_charge(&working, action, &outcome, &price, policy, now)?;
        Ok(Some(Charged {
            transition,
            key,
            invoice,
            price,
            applied_change,
            collected,
        }))
    }
}
