//! Steps shared by handlers that charge, persist, and publish.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::application::BillingContext;
use crate::domain::catalog::{Plan, Price};
use crate::domain::foundation::{
    Currency, CustomerId, DomainEvent, EventEnvelope, EventMetadata, InvoiceId, PaymentId, PlanId,
    PriceId, SubscriptionId, Timestamp,
};
use crate::domain::invoice::{Invoice, LineItem};
use crate::domain::promotion::AppliedDiscount;
use crate::domain::subscription::{machine, Subscription, SubscriptionEventKind, Transition};
use crate::domain::{AdapterKind, BillingError};
use crate::ports::{
    EventPublisher, IdempotencyKey, PaymentError, PaymentProvider, PaymentRequest, PaymentStatus,
};

/// Failure code used when a customer has nothing to charge.
pub const NO_PAYMENT_METHOD: &str = "no_payment_method";

/// Result of trying to collect money.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Collection {
    /// `payment_id` is `None` when nothing was owed.
    Paid {
        payment_id: Option<PaymentId>,
        amount: i64,
    },
    Declined {
        code: String,
        message: String,
    },
    /// The processor has not settled yet; nothing may change.
    Pending,
}

pub(crate) struct Charge<'a> {
    pub customer_id: &'a CustomerId,
    pub amount: i64,
    pub currency: &'a Currency,
    pub idempotency_key: &'a IdempotencyKey,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

fn payment_failure(err: PaymentError) -> BillingError {
    BillingError::adapter(AdapterKind::Payment, err.to_string())
}

fn declined(err: &PaymentError) -> Collection {
    Collection::Declined {
        code: err.code.as_str().to_string(),
        message: err.message.clone(),
    }
}

/// Charges the customer's default payment method.
///
/// Declines (including a missing payment method) are definitive results;
/// transport and provider failures are returned as `Adapter` errors.
pub(crate) async fn collect(
    payments: &dyn PaymentProvider,
    charge: Charge<'_>,
) -> Result<Collection, BillingError> {
    if charge.amount <= 0 {
        debug!(customer_id = %charge.customer_id, "nothing owed, skipping payment");
        return Ok(Collection::Paid {
            payment_id: None,
            amount: 0,
        });
    }

    let method = match payments.default_payment_method(charge.customer_id).await {
        Ok(Some(method)) => method,
        Ok(None) => {
            return Ok(Collection::Declined {
                code: NO_PAYMENT_METHOD.to_string(),
                message: format!("Customer {} has no default payment method", charge.customer_id),
            })
        }
        Err(err) if err.is_decline() => return Ok(declined(&err)),
        Err(err) => return Err(payment_failure(err)),
    };

    let request = PaymentRequest {
        customer_id: charge.customer_id.clone(),
        amount: charge.amount,
        currency: charge.currency.clone(),
        payment_method: method,
        idempotency_key: charge.idempotency_key.clone(),
        description: charge.description,
        metadata: charge.metadata,
    };

    match payments.create_payment(request).await {
        Ok(payment) => Ok(match payment.status {
            PaymentStatus::Succeeded => Collection::Paid {
                payment_id: Some(payment.id),
                amount: payment.amount,
            },
            PaymentStatus::Failed => Collection::Declined {
                code: payment
                    .failure_code
                    .unwrap_or_else(|| "payment_failed".to_string()),
                message: payment
                    .failure_message
                    .unwrap_or_else(|| "Payment failed".to_string()),
            },
            PaymentStatus::Pending => Collection::Pending,
        }),
        Err(err) if err.is_decline() => Ok(declined(&err)),
        Err(err) => Err(payment_failure(err)),
    }
}

/// Open invoice whose id derives from the charge's idempotency key.
pub(crate) fn open_invoice(
    key: &IdempotencyKey,
    customer_id: &CustomerId,
    currency: &Currency,
    subscription_id: Option<SubscriptionId>,
    lines: Vec<LineItem>,
    discounts: Vec<AppliedDiscount>,
    now: Timestamp,
) -> Result<Invoice, BillingError> {
    let mut invoice =
        Invoice::for_idempotency_key(key.as_str(), customer_id.clone(), currency.clone(), now);
    if let Some(id) = subscription_id {
        invoice = invoice.for_subscription(id);
    }
    for line in lines {
        invoice.add_line(line)?;
    }
    if !discounts.is_empty() {
        invoice.set_discounts(discounts)?;
    }
    invoice.finalize(now)?;
    Ok(invoice)
}

/// Marks the invoice paid and stores it.
pub(crate) async fn settle_invoice(
    ctx: &BillingContext,
    mut invoice: Invoice,
    payment_id: Option<PaymentId>,
    now: Timestamp,
) -> Result<Invoice, BillingError> {
    invoice.mark_paid(payment_id, now)?;
    ctx.invoices
        .save(&invoice)
        .await
        .map_err(BillingError::from_storage)?;
    Ok(invoice)
}

/// Publishes an event whose state change is already stored.
///
/// A failure here cannot undo the write, so it is logged, not returned.
pub(crate) async fn publish<E>(events: &dyn EventPublisher, event: &E, metadata: EventMetadata)
where
    E: DomainEvent + Serialize,
{
    let mut envelope = match EventEnvelope::from_event(event) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(
                %err,
                event_type = event.event_type(),
                aggregate_id = %event.aggregate_id(),
                "failed to serialize event"
            );
            return;
        }
    };
    envelope.metadata = metadata;

    if let Err(err) = events.publish(envelope).await {
        error!(
            %err,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id(),
            "failed to publish event after commit"
        );
    }
}

/// Stores the transition with compare-and-swap, then publishes its event.
pub(crate) async fn commit(
    ctx: &BillingContext,
    expected_version: u64,
    transition: Transition,
    metadata: EventMetadata,
) -> Result<Subscription, BillingError> {
    let stored = ctx
        .subscriptions
        .compare_and_swap(expected_version, &transition.subscription)
        .await
        .map_err(BillingError::from_storage)?;
    publish(ctx.events.as_ref(), &transition.event, metadata).await;
    Ok(stored)
}

const RECORD_ATTEMPTS: usize = 3;

/// How a collected payment ended up on the subscription.
#[derive(Debug)]
pub(crate) enum Recorded {
    /// A transition recording the payment was stored.
    Committed {
        subscription: Subscription,
        kind: SubscriptionEventKind,
    },
    /// Another writer already moved the subscription past the charged state,
    /// which only a collection under the same key can do.
    AlreadyRecorded(Subscription),
}

/// A payment that was collected for `charged_from` but not yet stored.
pub(crate) struct Collected<'a> {
    pub charged_from: &'a Subscription,
    pub amount: i64,
    pub invoice_id: InvoiceId,
}

/// Records a collected payment after its compare-and-swap lost.
///
/// Re-reads the subscription. When only unrelated fields changed, `replay`
/// rebuilds the transition on the fresh value; when the status changed,
/// or `replay` cannot apply, the amount is kept as account credit.
pub(crate) async fn record_collected<F>(
    ctx: &BillingContext,
    collected: Collected<'_>,
    metadata: EventMetadata,
    now: Timestamp,
    replay: F,
) -> Result<Recorded, BillingError>
where
    F: Fn(&Subscription) -> Result<Transition, BillingError>,
{
    let charged_from = collected.charged_from;
    for _ in 0..RECORD_ATTEMPTS {
        let fresh = load_subscription(ctx, &charged_from.id).await?;
        if fresh.current_period_start != charged_from.current_period_start
            || fresh.retry_count != charged_from.retry_count
        {
            info!(subscription_id = %fresh.id, "payment already recorded by a concurrent writer");
            return Ok(Recorded::AlreadyRecorded(fresh));
        }

        let transition = match (fresh.status == charged_from.status)
            .then(|| replay(&fresh))
            .and_then(Result::ok)
        {
            Some(transition) => transition,
            None if collected.amount <= 0 => return Err(BillingError::conflict(fresh.id)),
            None => {
                warn!(
                    subscription_id = %fresh.id,
                    status = %fresh.status,
                    amount = collected.amount,
                    "subscription changed during charge, crediting payment"
                );
                machine::credit_payment(&fresh, collected.amount, collected.invoice_id, now)?
            }
        };

        let kind = transition.event.kind.clone();
        match commit(ctx, fresh.version, transition, metadata.clone()).await {
            Ok(subscription) => return Ok(Recorded::Committed { subscription, kind }),
            Err(BillingError::ConcurrencyConflict { .. }) => continue,
            Err(err) => return Err(err),
        }
    }

    error!(
        subscription_id = %charged_from.id,
        invoice_id = %collected.invoice_id,
        amount = collected.amount,
        "collected payment could not be recorded"
    );
    Err(BillingError::conflict(charged_from.id))
}

pub(crate) async fn load_subscription(
    ctx: &BillingContext,
    id: &SubscriptionId,
) -> Result<Subscription, BillingError> {
    ctx.subscriptions
        .find_by_id(id)
        .await
        .map_err(BillingError::from_storage)?
        .ok_or_else(|| BillingError::not_found("Subscription", id))
}

pub(crate) async fn load_price(ctx: &BillingContext, id: &PriceId) -> Result<Price, BillingError> {
    ctx.catalog
        .find_price(id)
        .await
        .map_err(BillingError::from_storage)?
        .ok_or_else(|| BillingError::not_found("Price", id))
}

pub(crate) async fn load_plan(ctx: &BillingContext, id: &PlanId) -> Result<Plan, BillingError> {
    ctx.catalog
        .find_plan(id)
        .await
        .map_err(BillingError::from_storage)?
        .ok_or_else(|| BillingError::not_found("Plan", id))
}

/// Loads a plan and one of its prices, both open for new business.
pub(crate) async fn load_purchasable(
    ctx: &BillingContext,
    plan_id: &PlanId,
    price_id: &PriceId,
) -> Result<(Plan, Price), BillingError> {
    let price = load_price(ctx, price_id).await?;
    if &price.plan_id != plan_id {
        return Err(BillingError::validation(
            "price_id",
            format!("Price {} does not belong to plan {}", price_id, plan_id),
        ));
    }
    if !price.active {
        return Err(BillingError::validation(
            "price_id",
            format!("Price {} is not active", price_id),
        ));
    }
    let plan = load_plan(ctx, plan_id).await?;
    if !plan.active {
        return Err(BillingError::validation(
            "plan_id",
            format!("Plan {} is not active", plan_id),
        ));
    }
    Ok((plan, price))
}

pub(crate) fn metadata_for(key: Option<&IdempotencyKey>) -> EventMetadata {
    EventMetadata {
        correlation_id: None,
        idempotency_key: key.map(|k| k.as_str().to_string()),
    }
}
