//! Discount arithmetic and stacking.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Currency, PromoCodeId, ValidationError};

use super::{NormalizedCode, PromoCode};

/// Amount taken off a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent, 1 to 100.
    Percentage { value: u8 },
    /// Minor units off; restricted to `currency` when set.
    FixedAmount {
        value: i64,
        currency: Option<Currency>,
    },
}

impl Discount {
    pub fn percentage(value: u8) -> Result<Self, ValidationError> {
        if !(1..=100).contains(&value) {
            return Err(ValidationError::out_of_range(
                "discount_percentage",
                1,
                100,
                i64::from(value),
            ));
        }
        Ok(Discount::Percentage { value })
    }

    pub fn fixed_amount(value: i64, currency: Option<Currency>) -> Result<Self, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::out_of_range(
                "discount_amount",
                1,
                i64::MAX,
                value,
            ));
        }
        Ok(Discount::FixedAmount { value, currency })
    }

    /// Discount on `amount`, never more than `amount`.
    ///
    /// Percentages round down so the customer never gets more than the
    /// advertised share.
    pub fn amount_off(&self, amount: i64) -> i64 {
        if amount <= 0 {
            return 0;
        }
        match self {
            Discount::Percentage { value } => {
                let off = i128::from(amount) * i128::from(*value) / 100;
                i64::try_from(off).unwrap_or(amount).min(amount)
            }
            Discount::FixedAmount { value, .. } => (*value).min(amount),
        }
    }

    fn is_percentage(&self) -> bool {
        matches!(self, Discount::Percentage { .. })
    }
}

/// Whether a code combines with others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingMode {
    /// Replaces every earlier code and is replaced by any later one.
    #[default]
    None,
    /// Applies after earlier stackable codes, on what remains.
    Stack,
}

/// Order in which stackable codes are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingOrder {
    /// The order the customer entered them.
    #[default]
    AsListed,
    PercentageFirst,
    FixedFirst,
}

/// One code's contribution to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub promo_code_id: PromoCodeId,
    pub code: NormalizedCode,
    pub amount: i64,
}

/// Priced result of applying codes to a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub subtotal: i64,
    pub discounts: Vec<AppliedDiscount>,
    pub total: i64,
}

impl DiscountQuote {
    pub fn discount_total(&self) -> i64 {
        self.subtotal - self.total
    }
}

/// Picks the codes that survive stacking rules, in application order.
pub fn effective_codes<'a>(codes: &'a [PromoCode], order: StackingOrder) -> Vec<&'a PromoCode> {
    let mut effective: Vec<&PromoCode> = Vec::new();
    for code in codes {
        let replaces = code.stacking_mode == StackingMode::None
            || effective
                .iter()
                .any(|applied| applied.stacking_mode == StackingMode::None);
        if replaces {
            effective.clear();
        }
        effective.push(code);
    }

    match order {
        StackingOrder::AsListed => {}
        StackingOrder::PercentageFirst => {
            effective.sort_by_key(|code| !code.discount.is_percentage());
        }
        StackingOrder::FixedFirst => {
            effective.sort_by_key(|code| code.discount.is_percentage());
        }
    }
    effective
}

/// Applies already-validated codes to `amount`.
///
/// Each code discounts what remains after the codes before it, so the
/// total never drops below zero.
pub fn quote(codes: &[PromoCode], amount: i64, order: StackingOrder) -> DiscountQuote {
    let subtotal = amount.max(0);
    let mut remaining = subtotal;
    let mut discounts = Vec::new();

    for code in effective_codes(codes, order) {
        let off = code.discount.amount_off(remaining);
        remaining -= off;
        discounts.push(AppliedDiscount {
            promo_code_id: code.id,
            code: code.code.clone(),
            amount: off,
        });
    }

    DiscountQuote {
        subtotal,
        discounts,
        total: remaining,
    }
}
