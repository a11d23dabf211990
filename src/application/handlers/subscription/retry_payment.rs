//! RetryPaymentHandler - Customer-initiated collection of an overdue renewal.
//!
//! Unlike scheduled retries, a decline here is reported to the caller and
//! does not advance dunning. Both share one payment key per dunning step,
//! so a manual retry racing the scheduled one collects once.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::application::BillingContext;
use crate::domain::foundation::SubscriptionId;
use crate::domain::invoice::{InvoicePaid, LineItem, LineItemKind};
use crate::domain::subscription::{machine, ChargeOutcome, LifecycleAction, Subscription};
use crate::domain::{AdapterKind, BillingError};
use crate::ports::IdempotencyKey;

use super::super::shared::{self, Charge, Collected, Collection, Recorded};

const MANUAL_RETRY: &str = "manual_retry";

/// Command to collect an overdue subscription now.
#[derive(Debug, Clone)]
pub struct RetryPaymentCommand {
    pub subscription_id: SubscriptionId,
    /// Defaults to the key of the current dunning step, shared with the
    /// scheduled retry. A declined attempt is replayed under that key, so
    /// retrying with a newly added card needs a fresh key.
    pub idempotency_key: Option<String>,
}

/// Handler for manual payment retries.
pub struct RetryPaymentHandler {
    ctx: BillingContext,
}

impl RetryPaymentHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, cmd: RetryPaymentCommand) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, &cmd.subscription_id).await?;
        if !subscription.status.is_dunning() {
            return Err(BillingError::invalid_state(
                subscription.status,
                "retry payment for",
            ));
        }

        let now = self.ctx.clock.now();
        let price = shared::load_price(&self.ctx, &subscription.price_id).await?;
        let due = machine::renewal_charge(&subscription, &price);
        let key = match cmd.idempotency_key {
            Some(key) => IdempotencyKey::explicit(key),
            None => IdempotencyKey::for_subscription(
                LifecycleAction::RetryPayment.key_purpose(),
                &subscription.id,
                subscription.current_period_start,
                subscription.retry_count,
            ),
        };

        let collection = shared::collect(
            self.ctx.payments.as_ref(),
            Charge {
                customer_id: &subscription.customer_id,
                amount: due.amount,
                currency: &price.currency,
                idempotency_key: &key,
                description: format!("Overdue renewal of subscription {}", subscription.id),
                metadata: BTreeMap::from([
                    ("subscription_id".to_string(), subscription.id.to_string()),
                    ("action".to_string(), MANUAL_RETRY.to_string()),
                ]),
            },
        )
        .await?;

        let (payment_id, amount) = match collection {
            Collection::Paid { payment_id, amount } => (payment_id, amount),
            Collection::Declined { code, message } => {
                info!(subscription_id = %subscription.id, decline_code = %code, "manual retry declined");
                return Err(BillingError::declined(code, message));
            }
            Collection::Pending => {
                return Err(BillingError::adapter(
                    AdapterKind::Payment,
                    format!("payment {} is still pending", key),
                ))
            }
        };

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
            &subscription.customer_id,
            &price.currency,
            Some(subscription.id),
            lines,
            Vec::new(),
            now,
        )?;
        let invoice = shared::settle_invoice(&self.ctx, invoice, payment_id, now).await?;

        let outcome = ChargeOutcome::Succeeded {
            amount,
            invoice_id: invoice.id,
        };
        let policy = self.ctx.config.dunning_policy();
        let replay = |base: &Subscription| {
            machine::resolve_charge(
                base,
                LifecycleAction::RetryPayment,
                &outcome,
                &price,
                &policy,
                now,
            )
        };
        let transition = replay(&subscription)?;

        let metadata = shared::metadata_for(Some(&key));
        let stored = match shared::commit(
            &self.ctx,
            subscription.version,
            transition,
            metadata.clone(),
        )
        .await
        {
            Ok(stored) => stored,
            Err(BillingError::ConcurrencyConflict { .. }) => {
                warn!(subscription_id = %subscription.id, "subscription changed during manual retry");
                let collected = Collected {
                    charged_from: &subscription,
                    amount,
                    invoice_id: invoice.id,
                };
                match shared::record_collected(&self.ctx, collected, metadata.clone(), now, replay)
                    .await?
                {
                    Recorded::Committed { subscription, .. } => subscription,
                    Recorded::AlreadyRecorded(fresh) => return Ok(fresh),
                }
            }
            Err(err) => return Err(err),
        };
        info!(subscription_id = %stored.id, amount, "overdue payment recovered");

        shared::publish(
            self.ctx.events.as_ref(),
            &InvoicePaid::for_invoice(&invoice, now),
            metadata,
        )
        .await;
        Ok(stored)
    }
}
