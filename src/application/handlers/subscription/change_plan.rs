//! ChangePlanHandler - Moves a subscription to another plan and price.
//!
//! # Behavior
//!
//! - `ApplyAt::PeriodEnd` stores the change; the next renewal bills the new price.
//! - `ApplyAt::Immediately` with `CreateProrations` charges a positive net
//!   difference now and credits a negative one to `credit_balance`.
//! - `ProrationBehavior::None`, or a subscription still in trial, switches
//!   without any money moving.

use std::collections::BTreeMap;

use tracing::info;

use crate::application::BillingContext;
use crate::domain::catalog::{Plan, Price};
use crate::domain::foundation::{EventMetadata, PlanId, PriceId, SubscriptionId, Timestamp};
use crate::domain::invoice::{InvoicePaid, LineItem, LineItemKind};
use crate::domain::proration::{calculate_proration_with, Proration, ProrationAmounts};
use crate::domain::subscription::{machine, Subscription, SubscriptionStatus};
use crate::domain::{AdapterKind, BillingError};
use crate::ports::IdempotencyKey;

use super::super::shared::{self, Charge, Collection};

/// How a mid-cycle change is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProrationBehavior {
    /// Charge or credit the unused difference.
    #[default]
    CreateProrations,
    /// Switch without adjustment.
    None,
}

/// When the change takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyAt {
    #[default]
    Immediately,
    PeriodEnd,
}

/// Command to change a subscription's plan.
#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub subscription_id: SubscriptionId,
    pub new_plan_id: PlanId,
    pub new_price_id: PriceId,
    pub proration_behavior: ProrationBehavior,
    pub apply_at: ApplyAt,
}

/// Handler for plan changes.
pub struct ChangePlanHandler {
    ctx: BillingContext,
}

impl ChangePlanHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, cmd: ChangePlanCommand) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, &cmd.subscription_id).await?;
        if !matches!(
            subscription.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        ) {
            return Err(BillingError::invalid_state(
                subscription.status,
                "change plan of",
            ));
        }

        let (plan, price) =
            shared::load_purchasable(&self.ctx, &cmd.new_plan_id, &cmd.new_price_id).await?;
        if price.id == subscription.price_id {
            return Err(BillingError::validation(
                "new_price_id",
                format!("Subscription is already on price {}", price.id),
            ));
        }

        let now = self.ctx.clock.now();
        if cmd.apply_at == ApplyAt::PeriodEnd {
            return self.schedule(&subscription, &plan, &price, now).await;
        }

        if cmd.proration_behavior == ProrationBehavior::None
            || subscription.status == SubscriptionStatus::Trialing
        {
            let transition = machine::change_plan_now(&subscription, &plan, &price, 0, None, now)?;
            return self.finish(&subscription, transition, EventMetadata::default()).await;
        }

        let current_price = shared::load_price(&self.ctx, &subscription.price_id).await?;
        let proration = calculate_proration_with(
            &current_price,
            &price,
            subscription.current_period_start,
            subscription.current_period_end,
            now,
            self.ctx.config.cross_interval_policy,
        )?;

        match proration {
            Proration::Deferred => {
                info!(subscription_id = %subscription.id, "no proration possible, deferring change to period end");
                self.schedule(&subscription, &plan, &price, now).await
            }
            Proration::Immediate(amounts) if amounts.net_amount > 0 => {
                self.charge_upgrade(&subscription, &current_price, &plan, &price, &amounts, now)
                    .await
            }
            Proration::Immediate(amounts) => {
                let transition = machine::change_plan_now(
                    &subscription,
                    &plan,
                    &price,
                    amounts.net_amount,
                    None,
                    now,
                )?;
                self.finish(&subscription, transition, EventMetadata::default()).await
            }
        }
    }

    async fn schedule(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        price: &Price,
        now: Timestamp,
    ) -> Result<Subscription, BillingError> {
        let transition = machine::schedule_plan_change(subscription, plan, price, now)?;
        self.finish(subscription, transition, EventMetadata::default()).await
    }

    async fn charge_upgrade(
        &self,
        subscription: &Subscription,
        current_price: &Price,
        plan: &Plan,
        price: &Price,
        amounts: &ProrationAmounts,
        now: Timestamp,
    ) -> Result<Subscription, BillingError> {
        // Stable across a retry after a lost write, which replays the payment.
        let key = IdempotencyKey::explicit(format!(
            "plan_change_{}_{}_{}",
            subscription.id,
            price.id,
            subscription.current_period_start.as_unix_secs()
        ));

        let collection = shared::collect(
            self.ctx.payments.as_ref(),
            Charge {
                customer_id: &subscription.customer_id,
                amount: amounts.net_amount,
                currency: &price.currency,
                idempotency_key: &key,
                description: format!("Upgrade to {}", plan.name),
                metadata: BTreeMap::from([
                    ("subscription_id".to_string(), subscription.id.to_string()),
                    ("price_id".to_string(), price.id.to_string()),
                ]),
            },
        )
        .await?;

        let payment_id = match collection {
            Collection::Paid { payment_id, .. } => payment_id,
            Collection::Declined { code, message } => {
                info!(subscription_id = %subscription.id, decline_code = %code, "upgrade payment declined");
                return Err(BillingError::declined(code, message));
            }
            Collection::Pending => {
                return Err(BillingError::adapter(
                    AdapterKind::Payment,
                    format!("payment {} is still pending", key),
                ))
            }
        };

        let lines = vec![
            LineItem::new(
                format!(
                    "Unused time on {} ({} of {} days)",
                    current_price.id, amounts.days_remaining, amounts.total_days
                ),
                -amounts.unused_credit,
                LineItemKind::ProrationCredit,
            ),
            LineItem::new(
                format!(
                    "Remaining time on {} ({} of {} days)",
                    price.id, amounts.days_remaining, amounts.total_days
                ),
                amounts.new_charge,
                LineItemKind::ProrationCharge,
            ),
        ];
        let invoice = shared::open_invoice(
            &key,
            &subscription.customer_id,
            &price.currency,
            Some(subscription.id),
            lines,
            Vec::new(),
            now,
        )?;
        let invoice = shared::settle_invoice(&self.ctx, invoice, payment_id, now).await?;

        let transition = machine::change_plan_now(
            subscription,
            plan,
            price,
            amounts.net_amount,
            Some(invoice.id),
            now,
        )?;
        let metadata = shared::metadata_for(Some(&key));
        let stored = self.finish(subscription, transition, metadata.clone()).await?;

        shared::publish(
            self.ctx.events.as_ref(),
            &InvoicePaid::for_invoice(&invoice, now),
            metadata,
        )
        .await;
        Ok(stored)
    }

    async fn finish(
        &self,
        subscription: &Subscription,
        transition: machine::Transition,
        metadata: EventMetadata,
    ) -> Result<Subscription, BillingError> {
        let event_type = transition.event.kind.event_type();
        let stored = shared::commit(&self.ctx, subscription.version, transition, metadata).await?;
        info!(
            subscription_id = %stored.id,
            plan_id = %stored.plan_id,
            event_type,
            "plan change recorded"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::testing::{customer, plan_id, price_id, TestBed};
    use crate::config::BillingConfig;
    use crate::domain::proration::CrossIntervalPolicy;
    use crate::domain::ErrorKind;
    use crate::ports::InvoiceRepository;

    fn change(sub: &Subscription, plan: &str, price: &str) -> ChangePlanCommand {
        ChangePlanCommand {
            subscription_id: sub.id,
            new_plan_id: plan_id(plan),
            new_price_id: price_id(price),
            proration_behavior: ProrationBehavior::CreateProrations,
            apply_at: ApplyAt::Immediately,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Immediate changes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn mid_cycle_upgrade_charges_net_difference() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(15);

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "enterprise", "price_ent"))
            .await
            .unwrap();

        assert_eq!(stored.plan_id, plan_id("enterprise"));
        assert_eq!(stored.current_period_end, sub.current_period_end);
        assert_eq!(bed.payments.collected_amount(), 5_000);

        let invoice = &bed.invoices.find_by_customer(&customer()).await.unwrap()[0];
        assert_eq!(invoice.total, 5_000);
        assert_eq!(invoice.lines[0].amount, -5_000);
        assert_eq!(invoice.lines[1].amount, 10_000);

        let event = &bed.events.events_of_type("subscription.plan_changed")[0];
        assert_eq!(event.payload["net_amount"], 5_000);
    }

    #[tokio::test]
    async fn upgrade_retried_after_lost_write_charges_once() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(15);
        let racing = bed.ctx_writing_during_charge(sub.id, |s| s.cancel_at_period_end = true);

        let err = ChangePlanHandler::new(racing)
            .handle(change(&sub, "enterprise", "price_ent"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "enterprise", "price_ent"))
            .await
            .unwrap();

        assert_eq!(stored.plan_id, plan_id("enterprise"));
        assert!(stored.cancel_at_period_end);
        assert_eq!(bed.payments.requests().len(), 2);
        assert_eq!(bed.payments.successful_charges(), 1);
        assert_eq!(bed.payments.collected_amount(), 5_000);
        assert_eq!(bed.invoices.count().await, 1);
    }

    #[tokio::test]
    async fn mid_cycle_downgrade_credits_balance() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(15);

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "basic", "price_basic"))
            .await
            .unwrap();

        assert_eq!(stored.plan_id, plan_id("basic"));
        assert_eq!(stored.credit_balance, 2_500);
        assert!(bed.payments.requests().is_empty());
    }

    #[tokio::test]
    async fn without_proration_switches_for_free() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(15);
        let mut cmd = change(&sub, "enterprise", "price_ent");
        cmd.proration_behavior = ProrationBehavior::None;

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(cmd)
            .await
            .unwrap();

        assert_eq!(stored.price_id, price_id("price_ent"));
        assert_eq!(stored.credit_balance, 0);
        assert!(bed.payments.requests().is_empty());
    }

    #[tokio::test]
    async fn declined_upgrade_keeps_current_plan() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.payments.decline_next(&customer(), 1);
        bed.clock.advance_days(15);

        let err = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "enterprise", "price_ent"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PaymentDeclined);
        assert_eq!(bed.stored(&sub.id).await, sub);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Deferred changes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn period_end_change_is_scheduled() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        let mut cmd = change(&sub, "enterprise", "price_ent");
        cmd.apply_at = ApplyAt::PeriodEnd;

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(cmd)
            .await
            .unwrap();

        assert_eq!(stored.plan_id, plan_id("pro"));
        let pending = stored.pending_plan_change.unwrap();
        assert_eq!(pending.new_price_id, price_id("price_ent"));
        assert_eq!(pending.apply_at, sub.current_period_end);
        assert!(bed.events.has_event("subscription.plan_change_scheduled"));
    }

    #[tokio::test]
    async fn cross_interval_change_is_rejected_by_default() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(10);

        let err = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "pro", "price_pro_yearly"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cross_interval_change_defers_when_configured() {
        let config = BillingConfig {
            cross_interval_policy: CrossIntervalPolicy::DeferToPeriodEnd,
            ..Default::default()
        };
        let bed = TestBed::with_config(config).await;
        let sub = bed.active_subscription().await;
        bed.clock.advance_days(10);

        let stored = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "pro", "price_pro_yearly"))
            .await
            .unwrap();

        assert!(stored.pending_plan_change.is_some());
        assert!(bed.payments.requests().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn price_must_belong_to_plan() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;

        let err = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "basic", "price_ent"))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "price_id"));
    }

    #[tokio::test]
    async fn same_price_is_rejected() {
        let bed = TestBed::new().await;
        let sub = bed.active_subscription().await;

        let err = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "pro", "price_pro"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn paused_subscription_cannot_change_plan() {
        let bed = TestBed::new().await;
        let mut sub = bed.active_subscription().await;
        sub.status = SubscriptionStatus::Paused;
        bed.subscriptions.force_put(sub.clone()).await;

        let err = ChangePlanHandler::new(bed.ctx.clone())
            .handle(change(&sub, "enterprise", "price_ent"))
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::invalid_state("paused", "change plan of"));
    }
}
