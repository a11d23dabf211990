//! ChargeCustomerHandler - One-off charges with explicit line items.

use std::collections::BTreeMap;

use tracing::info;

use crate::application::BillingContext;
use crate::domain::foundation::{Currency, CustomerId, InvoiceId, SubscriptionId};
use crate::domain::invoice::{Invoice, InvoicePaid, LineItem};
use crate::domain::promotion::{quote, RedemptionContext};
use crate::domain::{AdapterKind, BillingError};
use crate::ports::IdempotencyKey;

use super::super::promotion;
use super::super::shared::{self, Charge, Collection};

/// Command to charge a customer once.
#[derive(Debug, Clone)]
pub struct ChargeCustomerCommand {
    pub customer_id: CustomerId,
    pub currency: Currency,
    pub lines: Vec<LineItem>,
    pub promo_codes: Vec<String>,
    /// Required. Reusing a key returns the invoice it already paid.
    pub idempotency_key: String,
    pub description: String,
    /// Links the invoice to a subscription without changing it.
    pub subscription_id: Option<SubscriptionId>,
}

#[derive(Debug, Clone)]
pub struct ChargeCustomerResult {
    pub invoice: Invoice,
    /// True when the invoice was paid by an earlier request with the same key.
    pub replayed: bool,
}

pub struct ChargeCustomerHandler {
    ctx: BillingContext,
}

impl ChargeCustomerHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        cmd: ChargeCustomerCommand,
    ) -> Result<ChargeCustomerResult, BillingError> {
        if cmd.lines.is_empty() {
            return Err(BillingError::validation(
                "lines",
                "at least one line item is required",
            ));
        }
        if cmd.idempotency_key.trim().is_empty() {
            return Err(BillingError::validation(
                "idempotency_key",
                "an idempotency key is required for one-off charges",
            ));
        }
        let subtotal: i64 = cmd.lines.iter().map(|line| line.amount).sum();
        if subtotal < 0 {
            return Err(BillingError::validation(
                "lines",
                format!("line items total {}, which is negative", subtotal),
            ));
        }

        let key = IdempotencyKey::explicit(cmd.idempotency_key.clone());
        let existing = self
            .ctx
            .invoices
            .find_by_id(&InvoiceId::for_idempotency_key(key.as_str()))
            .await
            .map_err(BillingError::from_storage)?;
        if let Some(invoice) = existing.filter(Invoice::is_paid) {
            info!(invoice_id = %invoice.id, idempotency_key = %key, "returning paid invoice");
            return Ok(ChargeCustomerResult {
                invoice,
                replayed: true,
            });
        }

        let now = self.ctx.clock.now();
        let redemption = RedemptionContext {
            customer_id: cmd.customer_id.clone(),
            plan_id: None,
            product_id: None,
            amount: subtotal,
            currency: cmd.currency.clone(),
            interval: None,
            is_first_purchase: promotion::is_first_purchase(&self.ctx, &cmd.customer_id).await?,
            now,
        };
        let codes = promotion::resolve_codes(&self.ctx, &cmd.promo_codes, &redemption).await?;
        let quoted = quote(&codes, subtotal, self.ctx.config.stacking_order);

        let invoice = shared::open_invoice(
            &key,
            &cmd.customer_id,
            &cmd.currency,
            cmd.subscription_id,
            cmd.lines,
            quoted.discounts.clone(),
            now,
        )?;

        let mut metadata = BTreeMap::from([("invoice_id".to_string(), invoice.id.to_string())]);
        if let Some(subscription_id) = cmd.subscription_id {
            metadata.insert("subscription_id".to_string(), subscription_id.to_string());
        }
        let reserved =
            promotion::reserve_redemptions(&self.ctx, &cmd.customer_id, &quoted.discounts).await?;
        let collection = shared::collect(
            self.ctx.payments.as_ref(),
            Charge {
                customer_id: &cmd.customer_id,
                amount: quoted.total,
                currency: &cmd.currency,
                idempotency_key: &key,
                description: cmd.description,
                metadata,
            },
        )
        .await?;

        let payment_id = match collection {
            Collection::Paid { payment_id, .. } => payment_id,
            Collection::Declined { code, message } => {
                self.keep_open(&invoice).await?;
                info!(invoice_id = %invoice.id, decline_code = %code, "one-off charge declined");
                return Err(BillingError::declined(code, message));
            }
            Collection::Pending => {
                self.keep_open(&invoice).await?;
                return Err(BillingError::adapter(
                    AdapterKind::Payment,
                    format!("payment {} is still pending", key),
                ));
            }
        };

        let invoice = shared::settle_invoice(&self.ctx, invoice, payment_id, now).await?;
        info!(
            invoice_id = %invoice.id,
            customer_id = %invoice.customer_id,
            amount = invoice.total,
            "one-off charge collected"
        );

        let event_metadata = shared::metadata_for(Some(&key));
        promotion::publish_redemptions(
            &self.ctx,
            &invoice.customer_id,
            reserved,
            now,
            event_metadata.clone(),
        )
        .await;

        shared::publish(
            self.ctx.events.as_ref(),
            &InvoicePaid::for_invoice(&invoice, now),
            event_metadata,
        )
        .await;

        Ok(ChargeCustomerResult {
            invoice,
            replayed: false,
        })
    }

    async fn keep_open(&self, invoice: &Invoice) -> Result<(), BillingError> {
        self.ctx
            .invoices
            .save(invoice)
            .await
            .map_err(BillingError::from_storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::promotion::fixtures;
    use crate::application::handlers::testing::{customer, usd, TestBed};
    use crate::application::handlers::NO_PAYMENT_METHOD;
    use crate::domain::invoice::{InvoiceStatus, LineItemKind};
    use crate::domain::promotion::{Discount, NormalizedCode, PromoCode};
    use crate::domain::ErrorKind;
    use crate::ports::{InvoiceRepository, PromoCodeRepository};

    fn charge(key: &str) -> ChargeCustomerCommand {
        ChargeCustomerCommand {
            customer_id: customer(),
            currency: usd(),
            lines: vec![
                LineItem::new("Onboarding session", 1_500, LineItemKind::OneOff),
                LineItem::new("Data import", 500, LineItemKind::OneOff),
            ],
            promo_codes: Vec::new(),
            idempotency_key: key.to_string(),
            description: "Professional services".to_string(),
            subscription_id: None,
        }
    }

    #[tokio::test]
    async fn collects_line_total_and_pays_invoice() {
        let bed = TestBed::new().await;

        let result = ChargeCustomerHandler::new(bed.ctx.clone())
            .handle(charge("onboarding-1"))
            .await
            .unwrap();

        assert!(!result.replayed);
        assert_eq!(result.invoice.total, 2_000);
        assert_eq!(result.invoice.status, InvoiceStatus::Paid);
        assert_eq!(bed.payments.collected_amount(), 2_000);
        assert!(bed.events.has_event("invoice.paid"));
    }

    #[tokio::test]
    async fn promo_code_discounts_the_charge() {
        let bed = TestBed::new().await;
        fixtures::save_percentage(&bed, "WELCOME10", 10).await;
        let mut cmd = charge("onboarding-2");
        cmd.promo_codes = vec!["welcome10".to_string()];

        let result = ChargeCustomerHandler::new(bed.ctx.clone())
            .handle(cmd)
            .await
            .unwrap();

        assert_eq!(result.invoice.subtotal, 2_000);
        assert_eq!(result.invoice.total, 1_800);
        assert_eq!(bed.payments.collected_amount(), 1_800);
        assert!(bed.events.has_event("promo_code.redeemed"));
    }

    #[tokio::test]
    async fn same_key_returns_paid_invoice_without_recharging() {
        let bed = TestBed::new().await;
        let handler = ChargeCustomerHandler::new(bed.ctx.clone());

        let first = handler.handle(charge("onboarding-3")).await.unwrap();
        let second = handler.handle(charge("onboarding-3")).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.invoice.id, first.invoice.id);
        assert_eq!(bed.payments.successful_charges(), 1);
        assert_eq!(bed.events.events_of_type("invoice.paid").len(), 1);
    }

    #[tokio::test]
    async fn decline_leaves_invoice_open() {
        let bed = TestBed::new().await;
        bed.payments.decline_next(&customer(), 1);

        let err = ChargeCustomerHandler::new(bed.ctx.clone())
            .handle(charge("onboarding-4"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PaymentDeclined);
        let invoices = bed.invoices.find_by_customer(&customer()).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].status, InvoiceStatus::Open);
        assert!(!bed.events.has_event("invoice.paid"));
    }

    #[tokio::test]
    async fn declined_charge_still_uses_up_single_use_code() {
        let bed = TestBed::new().await;
        let promo = fixtures::save(
            &bed,
            PromoCode::new(
                NormalizedCode::try_new("onetime").unwrap(),
                Discount::percentage(50).unwrap(),
            )
            .with_max_redemptions(1),
        )
        .await;
        bed.payments.decline_next(&customer(), 1);
        let handler = ChargeCustomerHandler::new(bed.ctx.clone());
        let mut cmd = charge("onboarding-7");
        cmd.promo_codes = vec!["onetime".to_string()];

        let err = handler.handle(cmd.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PaymentDeclined);
        let stored = bed.promo_codes.find_by_code(&promo.code).await.unwrap().unwrap();
        assert_eq!(stored.current_redemptions, 1);
        assert!(!bed.events.has_event("promo_code.redeemed"));

        cmd.idempotency_key = "onboarding-8".to_string();
        let err = handler.handle(cmd).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(bed.payments.successful_charges(), 0);
    }

    #[tokio::test]
    async fn customer_without_card_is_declined() {
        let bed = TestBed::new().await;
        let mut cmd = charge("onboarding-5");
        cmd.customer_id = CustomerId::new("cus_no_card").unwrap();

        let err = ChargeCustomerHandler::new(bed.ctx.clone())
            .handle(cmd)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::PaymentDeclined { ref code, .. } if code == NO_PAYMENT_METHOD));
    }

    #[tokio::test]
    async fn rejects_empty_and_negative_charges() {
        let bed = TestBed::new().await;
        let handler = ChargeCustomerHandler::new(bed.ctx.clone());

        let mut empty = charge("onboarding-6");
        empty.lines.clear();
        assert_eq!(
            handler.handle(empty).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut negative = charge("onboarding-7");
        negative.lines = vec![LineItem::new("Refund", -100, LineItemKind::OneOff)];
        assert_eq!(
            handler.handle(negative).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(bed.payments.requests().is_empty());
    }
}
