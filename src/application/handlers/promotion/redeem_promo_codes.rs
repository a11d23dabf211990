//! RedeemPromoCodesHandler - Validates codes and commits their redemptions.

use crate::application::BillingContext;
use crate::domain::foundation::{BillingInterval, Currency, CustomerId, EventMetadata, PlanId};
use crate::domain::promotion::{DiscountQuote, PromoCodeRedeemed};
use crate::domain::BillingError;

use super::quote_promo_codes::{price_with_codes, QuotePromoCodesCommand};

/// Command to redeem `codes` against a charge of `amount`.
#[derive(Debug, Clone)]
pub struct RedeemPromoCodesCommand {
    pub customer_id: CustomerId,
    pub codes: Vec<String>,
    pub amount: i64,
    pub currency: Currency,
    pub plan_id: Option<PlanId>,
    pub interval: Option<BillingInterval>,
}

impl From<RedeemPromoCodesCommand> for QuotePromoCodesCommand {
    fn from(cmd: RedeemPromoCodesCommand) -> Self {
        QuotePromoCodesCommand {
            customer_id: cmd.customer_id,
            codes: cmd.codes,
            amount: cmd.amount,
            currency: cmd.currency,
            plan_id: cmd.plan_id,
            interval: cmd.interval,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedeemPromoCodesResult {
    pub quote: DiscountQuote,
    /// One entry per surviving code, in application order.
    pub redemptions: Vec<PromoCodeRedeemed>,
}

/// Handler for promo code redemption.
///
/// Each code is committed with one guarded increment. A code that hits its
/// limit between validation and commit fails the command; codes committed
/// before it stay redeemed.
pub struct RedeemPromoCodesHandler {
    ctx: BillingContext,
}

impl RedeemPromoCodesHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        cmd: RedeemPromoCodesCommand,
    ) -> Result<RedeemPromoCodesResult, BillingError> {
        let query = QuotePromoCodesCommand::from(cmd);
        let (_, quote) = price_with_codes(&self.ctx, &query).await?;

        let reserved =
            super::reserve_redemptions(&self.ctx, &query.customer_id, &quote.discounts).await?;
        let redemptions = super::publish_redemptions(
            &self.ctx,
            &query.customer_id,
            reserved,
            self.ctx.clock.now(),
            EventMetadata::default(),
        )
        .await;

        Ok(RedeemPromoCodesResult { quote, redemptions })
    }
}
