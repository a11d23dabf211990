//! Promotion handlers - promo code quoting and redemption.

mod quote_promo_codes;
mod redeem_promo_codes;

pub use quote_promo_codes::{QuotePromoCodesCommand, QuotePromoCodesHandler};
pub use redeem_promo_codes::{
    RedeemPromoCodesCommand, RedeemPromoCodesHandler, RedeemPromoCodesResult,
};

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::application::BillingContext;
use crate::domain::foundation::{CustomerId, EventId, EventMetadata, Timestamp};
use crate::domain::promotion::{
    AppliedDiscount, NormalizedCode, PromoCode, PromoCodeRedeemed, PromoRejection,
    RedemptionContext, RedemptionResult,
};
use crate::domain::BillingError;

use super::shared;

/// Looks up and validates every code against `redemption`, in order.
///
/// Fails on the first malformed, duplicated, unknown or rejected code.
pub(crate) async fn resolve_codes(
    ctx: &BillingContext,
    codes: &[String],
    redemption: &RedemptionContext,
) -> Result<Vec<PromoCode>, BillingError> {
    let mut seen = BTreeSet::new();
    let mut resolved = Vec::with_capacity(codes.len());

    for raw in codes {
        let code = NormalizedCode::try_new(raw)?;
        if !seen.insert(code.clone()) {
            return Err(BillingError::validation(
                "promo_code",
                format!("{} was given more than once", code),
            ));
        }

        let promo = ctx
            .promo_codes
            .find_by_code(&code)
            .await
            .map_err(BillingError::from_storage)?
            .ok_or_else(|| BillingError::not_found("Promo code", &code))?;

        let used = ctx
            .promo_codes
            .customer_redemptions(&promo.id, &redemption.customer_id)
            .await
            .map_err(BillingError::from_storage)?;

        promo
            .validate(redemption, used)
            .map_err(|rejection| BillingError::validation("promo_code", format!("{}: {}", code, rejection)))?;

        debug!(code = %code, customer_id = %redemption.customer_id, "promo code accepted");
        resolved.push(promo);
    }

    Ok(resolved)
}

/// True if the customer has never settled an invoice.
pub(crate) async fn is_first_purchase(
    ctx: &BillingContext,
    customer_id: &CustomerId,
) -> Result<bool, BillingError> {
    let invoices = ctx
        .invoices
        .find_by_customer(customer_id)
        .await
        .map_err(BillingError::from_storage)?;
    Ok(!invoices.iter().any(|invoice| invoice.is_paid()))
}

/// A redemption counted against a code's limits but not yet announced.
#[derive(Debug, Clone)]
pub(crate) struct Reservation {
    pub discount: AppliedDiscount,
    pub current_redemptions: u32,
}

/// Takes one guarded redemption per applied discount, in order.
///
/// Counters never decrease, so codes reserved before a failure stay
/// reserved; the error names the code that failed. Storage errors are
/// returned as they are.
pub(crate) async fn reserve_redemptions(
    ctx: &BillingContext,
    customer_id: &CustomerId,
    discounts: &[AppliedDiscount],
) -> Result<Vec<Reservation>, BillingError> {
    let mut reserved = Vec::with_capacity(discounts.len());

    for discount in discounts {
        let result = ctx
            .promo_codes
            .redeem_if_below_limit(&discount.promo_code_id, customer_id)
            .await
            .map_err(BillingError::from_storage)?;

        let current_redemptions = match result {
            RedemptionResult::Redeemed {
                current_redemptions,
            } => current_redemptions,
            RedemptionResult::GlobalLimitReached => {
                return Err(limit_reached(&discount.code, PromoRejection::Exhausted))
            }
            RedemptionResult::CustomerLimitReached => {
                return Err(limit_reached(
                    &discount.code,
                    PromoRejection::CustomerLimitReached,
                ))
            }
        };
        debug!(code = %discount.code, current_redemptions, "promo code reserved");
        reserved.push(Reservation {
            discount: discount.clone(),
            current_redemptions,
        });
    }

    Ok(reserved)
}

/// Publishes one `PromoCodeRedeemed` per reservation once its charge went through.
pub(crate) async fn publish_redemptions(
    ctx: &BillingContext,
    customer_id: &CustomerId,
    reserved: Vec<Reservation>,
    now: Timestamp,
    metadata: EventMetadata,
) -> Vec<PromoCodeRedeemed> {
    let mut redeemed = Vec::with_capacity(reserved.len());
    for Reservation {
        discount,
        current_redemptions,
    } in reserved
    {
        let event = PromoCodeRedeemed {
            event_id: EventId::new(),
            promo_code_id: discount.promo_code_id,
            code: discount.code,
            customer_id: customer_id.clone(),
            discount_amount: discount.amount,
            current_redemptions,
            occurred_at: now,
        };
        info!(
            code = %event.code,
            customer_id = %customer_id,
            current_redemptions,
            "promo code redeemed"
        );
        shared::publish(ctx.events.as_ref(), &event, metadata.clone()).await;
        redeemed.push(event);
    }
    redeemed
}

fn limit_reached(code: &NormalizedCode, rejection: PromoRejection) -> BillingError {
    BillingError::validation("promo_code", format!("{}: {}", code, rejection))
}
