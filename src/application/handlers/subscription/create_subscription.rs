//! CreateSubscriptionHandler - Subscribes a customer to a price.
//!
//! With trial days the subscription starts trialing and nothing is
//! charged. Otherwise the first period is charged up front and the
//! subscription only exists once that payment succeeded.

use std::collections::BTreeMap;

use tracing::info;

use crate::application::BillingContext;
use crate::domain::catalog::{AddOn, Plan, Price};
use crate::domain::foundation::{
    AddOnId, CustomerId, EventMetadata, InvoiceId, PriceId, SubscriptionId, Timestamp,
};
use crate::domain::invoice::{Invoice, InvoicePaid, LineItem, LineItemKind};
use crate::domain::promotion::{quote, RedemptionContext};
use crate::domain::subscription::{Subscription, SubscriptionEvent, SubscriptionEventKind};
use crate::domain::{AdapterKind, BillingError};
use crate::ports::IdempotencyKey;

use super::super::promotion;
use super::super::shared::{self, Charge, Collection};

/// Command to start a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub customer_id: CustomerId,
    pub price_id: PriceId,
    pub add_on_ids: Vec<AddOnId>,
    /// Overrides the price's trial length. `Some(0)` skips the trial.
    pub trial_days: Option<u32>,
    /// Applied to the first charge; not allowed with a trial.
    pub promo_codes: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    /// Makes a retried request return the subscription it already created.
    pub idempotency_key: Option<String>,
}

impl CreateSubscriptionCommand {
    pub fn new(customer_id: CustomerId, price_id: PriceId) -> Self {
        Self {
            customer_id,
            price_id,
            add_on_ids: Vec::new(),
            trial_days: None,
            promo_codes: Vec::new(),
            metadata: BTreeMap::new(),
            idempotency_key: None,
        }
    }
}

/// Result of successful subscription creation.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
    /// First-period invoice; `None` for trials.
    pub invoice: Option<Invoice>,
}

/// Handler for creating subscriptions.
pub struct CreateSubscriptionHandler {
    ctx: BillingContext,
}

impl CreateSubscriptionHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        let price = shared::load_price(&self.ctx, &cmd.price_id).await?;
        let (plan, price) = shared::load_purchasable(&self.ctx, &price.plan_id, &price.id).await?;
        self.load_add_ons(&cmd.add_on_ids).await?;

        let now = self.ctx.clock.now();
        let trial_days = cmd.trial_days.or(price.trial_days).unwrap_or(0);

        if trial_days > 0 {
            return self.start_trial(cmd, &plan, &price, trial_days, now).await;
        }
        self.start_paid(cmd, &plan, &price, now).await
    }

    async fn load_add_ons(&self, ids: &[AddOnId]) -> Result<Vec<AddOn>, BillingError> {
        let add_ons = self
            .ctx
            .catalog
            .find_add_ons(ids)
            .await
            .map_err(BillingError::from_storage)?;

        if let Some(missing) = ids.iter().find(|id| !add_ons.iter().any(|a| &a.id == *id)) {
            return Err(BillingError::not_found("Add-on", missing));
        }
        if let Some(inactive) = add_ons.iter().find(|a| !a.active) {
            return Err(BillingError::validation(
                "add_on_ids",
                format!("Add-on {} is not active", inactive.id),
            ));
        }
        Ok(add_ons)
    }

    async fn start_trial(
        &self,
        cmd: CreateSubscriptionCommand,
        plan: &Plan,
        price: &Price,
        trial_days: u32,
        now: Timestamp,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        if !cmd.promo_codes.is_empty() {
            return Err(BillingError::validation(
                "promo_codes",
                "promo codes cannot be applied to a trial",
            ));
        }

        let trial_end = now.add_days(i64::from(trial_days));
        let subscription = Subscription::new_trialing(
            SubscriptionId::new(),
            cmd.customer_id,
            plan.id.clone(),
            price.id.clone(),
            now,
            trial_end,
        )?
        .with_add_ons(cmd.add_on_ids)
        .with_metadata(cmd.metadata);

        self.ctx
            .subscriptions
            .insert(&subscription)
            .await
            .map_err(BillingError::from_storage)?;

        info!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer_id,
            plan_id = %plan.id,
            trial_days,
            "trial started"
        );
        self.publish_created(&subscription, None, EventMetadata::default(), now)
            .await;

        Ok(CreateSubscriptionResult {
            subscription,
            invoice: None,
        })
    }

    async fn start_paid(
        &self,
        cmd: CreateSubscriptionCommand,
        plan: &Plan,
        price: &Price,
        now: Timestamp,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        let subscription_id = SubscriptionId::new();
        let key = match &cmd.idempotency_key {
            Some(key) => IdempotencyKey::explicit(key.clone()),
            None => IdempotencyKey::explicit(format!("subscription_create_{}", subscription_id)),
        };

        if let Some(existing) = self.replayed(&key).await? {
            return Ok(existing);
        }

        let redemption = RedemptionContext {
            customer_id: cmd.customer_id.clone(),
            plan_id: Some(plan.id.clone()),
            product_id: plan.product_id.clone(),
            amount: price.unit_amount(),
            currency: price.currency.clone(),
            interval: Some(price.interval),
            is_first_purchase: promotion::is_first_purchase(&self.ctx, &cmd.customer_id).await?,
            now,
        };
        let codes = promotion::resolve_codes(&self.ctx, &cmd.promo_codes, &redemption).await?;
        let quoted = quote(&codes, price.unit_amount(), self.ctx.config.stacking_order);
        // Reserved before charging: a code with one use left discounts one checkout.
        let reserved =
            promotion::reserve_redemptions(&self.ctx, &cmd.customer_id, &quoted.discounts).await?;

        let collection = shared::collect(
            self.ctx.payments.as_ref(),
            Charge {
                customer_id: &cmd.customer_id,
                amount: quoted.total,
                currency: &price.currency,
                idempotency_key: &key,
                description: format!("First period of {}", plan.name),
                metadata: BTreeMap::from([
                    ("subscription_id".to_string(), subscription_id.to_string()),
                    ("price_id".to_string(), price.id.to_string()),
                ]),
            },
        )
        .await?;

        let payment_id = match collection {
            Collection::Paid { payment_id, .. } => payment_id,
            Collection::Declined { code, message } => {
                info!(customer_id = %cmd.customer_id, decline_code = %code, "first payment declined");
                return Err(BillingError::declined(code, message));
            }
            Collection::Pending => {
                return Err(BillingError::adapter(
                    AdapterKind::Payment,
                    format!("payment {} is still pending", key),
                ))
            }
        };

        let lines = vec![LineItem::new(
            format!("{} (every {} {})", plan.name, price.interval_count(), price.interval),
            price.unit_amount(),
            LineItemKind::Subscription,
        )];
        let invoice = shared::open_invoice(
            &key,
            &cmd.customer_id,
            &price.currency,
            Some(subscription_id),
            lines,
            quoted.discounts.clone(),
            now,
        )?;
        let invoice = shared::settle_invoice(&self.ctx, invoice, payment_id, now).await?;

        let period_end = price.period_end_from(now)?;
        let subscription = Subscription::new_active(
            subscription_id,
            cmd.customer_id.clone(),
            plan.id.clone(),
            price.id.clone(),
            now,
            period_end,
        )?
        .with_add_ons(cmd.add_on_ids)
        .with_metadata(cmd.metadata);

        self.ctx
            .subscriptions
            .insert(&subscription)
            .await
            .map_err(BillingError::from_storage)?;

        info!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer_id,
            plan_id = %plan.id,
            amount = invoice.total,
            "subscription created"
        );

        let metadata = shared::metadata_for(Some(&key));
        promotion::publish_redemptions(&self.ctx, &cmd.customer_id, reserved, now, metadata.clone())
            .await;

        self.publish_created(&subscription, Some(invoice.id), metadata.clone(), now)
            .await;
        shared::publish(
            self.ctx.events.as_ref(),
            &InvoicePaid::for_invoice(&invoice, now),
            metadata,
        )
        .await;

        Ok(CreateSubscriptionResult {
            subscription,
            invoice: Some(invoice),
        })
    }

    /// The subscription already created under `key`, if any.
    async fn replayed(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<CreateSubscriptionResult>, BillingError> {
        let invoice = self
            .ctx
            .invoices
            .find_by_id(&InvoiceId::for_idempotency_key(key.as_str()))
            .await
            .map_err(BillingError::from_storage)?;

        let Some(invoice) = invoice.filter(Invoice::is_paid) else {
            return Ok(None);
        };
        let Some(subscription_id) = invoice.subscription_id else {
            return Ok(None);
        };
        let subscription = self
            .ctx
            .subscriptions
            .find_by_id(&subscription_id)
            .await
            .map_err(BillingError::from_storage)?;

        Ok(subscription.map(|subscription| {
            info!(subscription_id = %subscription.id, idempotency_key = %key, "returning existing subscription");
            CreateSubscriptionResult {
                subscription,
                invoice: Some(invoice),
            }
        }))
    }

    async fn publish_created(
        &self,
        subscription: &Subscription,
        invoice_id: Option<InvoiceId>,
        metadata: EventMetadata,
        now: Timestamp,
    ) {
        let event = SubscriptionEvent::new(
            subscription.id,
            subscription.customer_id.clone(),
            now,
            SubscriptionEventKind::Created {
                plan_id: subscription.plan_id.clone(),
                price_id: subscription.price_id.clone(),
                status: subscription.status,
                trial_end: subscription.trial_end,
                invoice_id,
            },
        );
        shared::publish(self.ctx.events.as_ref(), &event, metadata).await;
    }
}
