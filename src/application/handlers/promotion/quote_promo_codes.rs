//! QuotePromoCodesHandler - Prices a charge with promo codes applied.
//!
//! Read-only: nothing is redeemed.

use crate::application::BillingContext;
use crate::domain::foundation::{BillingInterval, Currency, CustomerId, PlanId};
use crate::domain::promotion::{quote, DiscountQuote, PromoCode, RedemptionContext};
use crate::domain::BillingError;

use super::super::shared;

/// Query to price `amount` with `codes` applied.
#[derive(Debug, Clone)]
pub struct QuotePromoCodesCommand {
    pub customer_id: CustomerId,
    pub codes: Vec<String>,
    pub amount: i64,
    pub currency: Currency,
    /// Plan being bought, for plan and product restrictions.
    pub plan_id: Option<PlanId>,
    pub interval: Option<BillingInterval>,
}

/// Handler for discount quotes.
pub struct QuotePromoCodesHandler {
    ctx: BillingContext,
}

impl QuotePromoCodesHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, cmd: QuotePromoCodesCommand) -> Result<DiscountQuote, BillingError> {
        let (_, quoted) = price_with_codes(&self.ctx, &cmd).await?;
        Ok(quoted)
    }
}

/// Validates the codes and applies them in the configured stacking order.
pub(super) async fn price_with_codes(
    ctx: &BillingContext,
    cmd: &QuotePromoCodesCommand,
) -> Result<(Vec<PromoCode>, DiscountQuote), BillingError> {
    if cmd.amount < 0 {
        return Err(BillingError::validation(
            "amount",
            "amount must not be negative",
        ));
    }

    let product_id = match &cmd.plan_id {
        Some(plan_id) => shared::load_plan(ctx, plan_id).await?.product_id,
        None => None,
    };

    let redemption = RedemptionContext {
        customer_id: cmd.customer_id.clone(),
        plan_id: cmd.plan_id.clone(),
        product_id,
        amount: cmd.amount,
        currency: cmd.currency.clone(),
        interval: cmd.interval,
        is_first_purchase: super::is_first_purchase(ctx, &cmd.customer_id).await?,
        now: ctx.clock.now(),
    };

    let codes = super::resolve_codes(ctx, &cmd.codes, &redemption).await?;
    let quoted = quote(&codes, cmd.amount, ctx.config.stacking_order);
    Ok((codes, quoted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::promotion::fixtures;
    use crate::application::handlers::testing::{customer, plan_id, start, usd, TestBed};
    use crate::config::BillingConfig;
    use crate::domain::foundation::Currency;
    use crate::domain::promotion::{
        Condition, Discount, NormalizedCode, PromoCode, StackingOrder,
    };
    use crate::domain::{BillingError, ErrorKind};
    use crate::ports::PromoCodeRepository;

    fn query(codes: &[&str], amount: i64) -> QuotePromoCodesCommand {
        QuotePromoCodesCommand {
            customer_id: customer(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
            amount,
            currency: usd(),
            plan_id: Some(plan_id("pro")),
            interval: Some(BillingInterval::Month),
        }
    }

    fn fixed(code: &str, value: i64) -> PromoCode {
        PromoCode::new(
            NormalizedCode::try_new(code).unwrap(),
            Discount::fixed_amount(value, None).unwrap(),
        )
        .stackable()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Pricing
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn quotes_percentage_discount() {
        let bed = TestBed::new().await;
        fixtures::save_percentage(&bed, "spring20", 20).await;

        let quoted = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&[" Spring20 "], 10_000))
            .await
            .unwrap();

        assert_eq!(quoted.subtotal, 10_000);
        assert_eq!(quoted.total, 8_000);
        assert_eq!(quoted.discounts[0].code.as_str(), "SPRING20");
    }

    #[tokio::test]
    async fn stacking_order_follows_configuration() {
        let config = BillingConfig {
            stacking_order: StackingOrder::PercentageFirst,
            ..Default::default()
        };
        let bed = TestBed::with_config(config).await;
        fixtures::save(&bed, fixed("fivehundred", 500)).await;
        fixtures::save_percentage(&bed, "half", 50).await;

        let quoted = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["fivehundred", "half"], 10_000))
            .await
            .unwrap();

        // 50% of 10000, then 500 off the remainder.
        assert_eq!(quoted.total, 4_500);
        assert_eq!(quoted.discounts[0].code.as_str(), "HALF");
    }

    #[tokio::test]
    async fn quoting_does_not_redeem() {
        let bed = TestBed::new().await;
        let promo = fixtures::save_percentage(&bed, "spring20", 20).await;

        QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["spring20"], 10_000))
            .await
            .unwrap();

        let stored = bed
            .promo_codes
            .find_by_code(&promo.code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_redemptions, 0);
        assert_eq!(bed.events.event_count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let bed = TestBed::new().await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["nothing"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::not_found("Promo code", "NOTHING"));
    }

    #[tokio::test]
    async fn malformed_code_is_validation_error() {
        let bed = TestBed::new().await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["x"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn expired_code_names_reason() {
        let bed = TestBed::new().await;
        let promo = PromoCode::new(
            NormalizedCode::try_new("old").unwrap(),
            Discount::percentage(10).unwrap(),
        )
        .with_validity(None, Some(start().minus_days(1)));
        fixtures::save(&bed, promo).await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["old"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BillingError::validation("promo_code", "OLD: code has expired")
        );
    }

    #[tokio::test]
    async fn failed_condition_is_reported() {
        let bed = TestBed::new().await;
        let promo = PromoCode::new(
            NormalizedCode::try_new("big").unwrap(),
            Discount::percentage(10).unwrap(),
        )
        .with_condition(Condition::MinimumAmount { amount: 50_000 });
        fixtures::save(&bed, promo).await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["big"], 10_000))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("minimum charge"));
    }

    #[tokio::test]
    async fn code_restricted_to_other_plan_is_rejected() {
        let bed = TestBed::new().await;
        let promo = PromoCode::new(
            NormalizedCode::try_new("entonly").unwrap(),
            Discount::percentage(10).unwrap(),
        )
        .for_plans(vec![plan_id("enterprise")]);
        fixtures::save(&bed, promo).await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["entonly"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn fixed_code_in_other_currency_is_rejected() {
        let bed = TestBed::new().await;
        let promo = PromoCode::new(
            NormalizedCode::try_new("euro5").unwrap(),
            Discount::fixed_amount(500, Some(Currency::try_new("EUR").unwrap())).unwrap(),
        );
        fixtures::save(&bed, promo).await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["euro5"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() {
        let bed = TestBed::new().await;
        fixtures::save_percentage(&bed, "spring20", 20).await;

        let err = QuotePromoCodesHandler::new(bed.ctx.clone())
            .handle(query(&["spring20", "SPRING20"], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
