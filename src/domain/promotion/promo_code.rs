//! Promo code record and redemption rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{
    BillingInterval, Currency, CustomerId, PlanId, ProductId, PromoCodeId, Timestamp,
};

use super::{Discount, NormalizedCode, StackingMode};

/// Extra requirement a charge must meet for a code to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Charge of at least `amount` minor units.
    MinimumAmount { amount: i64 },
    Currency { currency: Currency },
    BillingInterval { interval: BillingInterval },
    /// Customer has never paid before.
    FirstPurchaseOnly,
}

impl Condition {
    pub fn is_met(&self, ctx: &RedemptionContext) -> bool {
        match self {
            Condition::MinimumAmount { amount } => ctx.amount >= *amount,
            Condition::Currency { currency } => &ctx.currency == currency,
            Condition::BillingInterval { interval } => ctx.interval == Some(*interval),
            Condition::FirstPurchaseOnly => ctx.is_first_purchase,
        }
    }

    fn describe(&self) -> String {
        match self {
            Condition::MinimumAmount { amount } => format!("requires a minimum charge of {}", amount),
            Condition::Currency { currency } => format!("only valid for {} charges", currency),
            Condition::BillingInterval { interval } => {
                format!("only valid when billed every {}", interval)
            }
            Condition::FirstPurchaseOnly => "only valid on a first purchase".to_string(),
        }
    }
}

/// Facts about the charge a code is being applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionContext {
    pub customer_id: CustomerId,
    pub plan_id: Option<PlanId>,
    pub product_id: Option<ProductId>,
    pub amount: i64,
    pub currency: Currency,
    pub interval: Option<BillingInterval>,
    pub is_first_purchase: bool,
    pub now: Timestamp,
}

/// Why a code cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("code is not active")]
    Inactive,
    #[error("code is not valid yet")]
    NotYetValid,
    #[error("code has expired")]
    Expired,
    #[error("code has reached its redemption limit")]
    Exhausted,
    #[error("code has already been used the maximum number of times by this customer")]
    CustomerLimitReached,
    #[error("code does not apply to this plan")]
    NotApplicable,
    #[error("code {0}")]
    ConditionFailed(String),
    #[error("code is for {expected} charges, not {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },
}

/// A promotional discount offered under a unique code.
///
/// # Invariants
///
/// - `code` is unique across all promo codes
/// - `current_redemptions` never decreases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: PromoCodeId,
    pub code: NormalizedCode,
    pub discount: Discount,
    pub stacking_mode: StackingMode,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
    pub max_redemptions: Option<u32>,
    pub current_redemptions: u32,
    pub max_redemptions_per_customer: Option<u32>,
    /// Empty means every plan.
    pub applicable_plan_ids: Vec<PlanId>,
    /// Empty means every product.
    pub applicable_product_ids: Vec<ProductId>,
    /// Checked in order; the first failure is reported.
    pub conditions: Vec<Condition>,
    pub active: bool,
}

impl PromoCode {
    /// Creates an active, unrestricted, non-stacking code.
    pub fn new(code: NormalizedCode, discount: Discount) -> Self {
        Self {
            id: PromoCodeId::new(),
            code,
            discount,
            stacking_mode: StackingMode::None,
            valid_from: None,
            valid_until: None,
            max_redemptions: None,
            current_redemptions: 0,
            max_redemptions_per_customer: None,
            applicable_plan_ids: Vec::new(),
            applicable_product_ids: Vec::new(),
            conditions: Vec::new(),
            active: true,
        }
    }

    pub fn stackable(mut self) -> Self {
        self.stacking_mode = StackingMode::Stack;
        self
    }

    pub fn with_max_redemptions(mut self, max: u32) -> Self {
        self.max_redemptions = Some(max);
        self
    }

    pub fn with_max_redemptions_per_customer(mut self, max: u32) -> Self {
        self.max_redemptions_per_customer = Some(max);
        self
    }

    pub fn with_validity(mut self, from: Option<Timestamp>, until: Option<Timestamp>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn for_plans(mut self, plan_ids: Vec<PlanId>) -> Self {
        self.applicable_plan_ids = plan_ids;
        self
    }

    pub fn for_products(mut self, product_ids: Vec<ProductId>) -> Self {
        self.applicable_product_ids = product_ids;
        self
    }

    /// True while the global limit still allows a redemption.
    pub fn has_remaining_redemptions(&self) -> bool {
        self.max_redemptions
            .map_or(true, |max| self.current_redemptions < max)
    }

    /// True while the customer may still redeem, given their prior count.
    pub fn customer_may_redeem(&self, customer_redemptions: u32) -> bool {
        self.max_redemptions_per_customer
            .map_or(true, |max| customer_redemptions < max)
    }

    fn applies_to(&self, ctx: &RedemptionContext) -> bool {
        let plan_ok = self.applicable_plan_ids.is_empty()
            || ctx
                .plan_id
                .as_ref()
                .is_some_and(|plan| self.applicable_plan_ids.contains(plan));
        let product_ok = self.applicable_product_ids.is_empty()
            || ctx
                .product_id
                .as_ref()
                .is_some_and(|product| self.applicable_product_ids.contains(product));
        plan_ok && product_ok
    }

    /// Checks every redemption rule, stopping at the first failure.
    ///
    /// Order: active, validity window, global limit, per-customer limit,
    /// plan/product applicability, then each condition in order.
    pub fn validate(
        &self,
        ctx: &RedemptionContext,
        customer_redemptions: u32,
    ) -> Result<(), PromoRejection> {
        if !self.active {
            return Err(PromoRejection::Inactive);
        }
        if self.valid_from.is_some_and(|from| ctx.now.is_before(&from)) {
            return Err(PromoRejection::NotYetValid);
        }
        if self.valid_until.is_some_and(|until| ctx.now.is_after(&until)) {
            return Err(PromoRejection::Expired);
        }
        if !self.has_remaining_redemptions() {
            return Err(PromoRejection::Exhausted);
        }
        if !self.customer_may_redeem(customer_redemptions) {
            return Err(PromoRejection::CustomerLimitReached);
        }
        if !self.applies_to(ctx) {
            return Err(PromoRejection::NotApplicable);
        }
        if let Some(failed) = self.conditions.iter().find(|c| !c.is_met(ctx)) {
            return Err(PromoRejection::ConditionFailed(failed.describe()));
        }
        if let Discount::FixedAmount {
            currency: Some(currency),
            ..
        } = &self.discount
        {
            if currency != &ctx.currency {
                return Err(PromoRejection::CurrencyMismatch {
                    expected: currency.clone(),
                    actual: ctx.currency.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of the storage adapter's guarded increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionResult {
    Redeemed { current_redemptions: u32 },
    GlobalLimitReached,
    CustomerLimitReached,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::try_new("USD").unwrap()
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_717_200_000).unwrap()
    }

    fn ctx() -> RedemptionContext {
        RedemptionContext {
            customer_id: CustomerId::new("cus_1").unwrap(),
            plan_id: Some(PlanId::new("pro").unwrap()),
            product_id: Some(ProductId::new("app").unwrap()),
            amount: 10_000,
            currency: usd(),
            interval: Some(BillingInterval::Month),
            is_first_purchase: false,
            now: t0(),
        }
    }

    fn promo() -> PromoCode {
        PromoCode::new(
            NormalizedCode::try_new("SPRING").unwrap(),
            Discount::percentage(10).unwrap(),
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Validation order
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn unrestricted_code_is_valid() {
        assert_eq!(promo().validate(&ctx(), 0), Ok(()));
    }

    #[test]
    fn inactive_is_checked_first() {
        let mut code = promo().with_max_redemptions(0);
        code.active = false;
        assert_eq!(code.validate(&ctx(), 0), Err(PromoRejection::Inactive));
    }

    #[test]
    fn validity_window_is_inclusive() {
        let code = promo().with_validity(Some(t0()), Some(t0()));
        assert_eq!(code.validate(&ctx(), 0), Ok(()));

        let future = promo().with_validity(Some(t0().plus_secs(1)), None);
        assert_eq!(future.validate(&ctx(), 0), Err(PromoRejection::NotYetValid));

        let past = promo().with_validity(None, Some(t0().plus_secs(-1)));
        assert_eq!(past.validate(&ctx(), 0), Err(PromoRejection::Expired));
    }

    #[test]
    fn global_limit_precedes_customer_limit() {
        let mut code = promo().with_max_redemptions(5).with_max_redemptions_per_customer(1);
        code.current_redemptions = 5;
        assert_eq!(code.validate(&ctx(), 1), Err(PromoRejection::Exhausted));

        code.current_redemptions = 4;
        assert_eq!(
            code.validate(&ctx(), 1),
            Err(PromoRejection::CustomerLimitReached)
        );
        assert_eq!(code.validate(&ctx(), 0), Ok(()));
    }

    #[test]
    fn plan_restriction_rejects_other_plans() {
        let code = promo().for_plans(vec![PlanId::new("enterprise").unwrap()]);
        assert_eq!(code.validate(&ctx(), 0), Err(PromoRejection::NotApplicable));

        let mut no_plan = ctx();
        no_plan.plan_id = None;
        assert_eq!(code.validate(&no_plan, 0), Err(PromoRejection::NotApplicable));
    }

    #[test]
    fn product_restriction_matches_product() {
        let code = promo().for_products(vec![ProductId::new("app").unwrap()]);
        assert_eq!(code.validate(&ctx(), 0), Ok(()));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Conditions
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn first_failing_condition_is_reported() {
        let code = promo()
            .with_condition(Condition::MinimumAmount { amount: 5_000 })
            .with_condition(Condition::FirstPurchaseOnly)
            .with_condition(Condition::MinimumAmount { amount: 50_000 });

        match code.validate(&ctx(), 0) {
            Err(PromoRejection::ConditionFailed(reason)) => {
                assert!(reason.contains("first purchase"), "{}", reason)
            }
            other => panic!("expected condition failure, got {:?}", other),
        }
    }

    #[test]
    fn interval_and_currency_conditions() {
        let yearly = promo().with_condition(Condition::BillingInterval {
            interval: BillingInterval::Year,
        });
        assert!(yearly.validate(&ctx(), 0).is_err());

        let usd_only = promo().with_condition(Condition::Currency { currency: usd() });
        assert_eq!(usd_only.validate(&ctx(), 0), Ok(()));
    }

    #[test]
    fn fixed_amount_in_other_currency_is_rejected() {
        let code = PromoCode::new(
            NormalizedCode::try_new("EUROFF").unwrap(),
            Discount::fixed_amount(500, Some(Currency::try_new("EUR").unwrap())).unwrap(),
        );
        assert!(matches!(
            code.validate(&ctx(), 0),
            Err(PromoRejection::CurrencyMismatch { .. })
        ));
    }
}
