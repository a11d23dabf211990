//! Proration arithmetic for mid-cycle price changes.
//!
//! Credits the unused share of the current price and charges the same share
//! of the new price. Both terms are computed per whole day remaining (a
//! partial day counts as a whole day) in exact integer arithmetic.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::Price;
use crate::domain::foundation::{Timestamp, ValidationError};

/// How to treat a change between prices with different billing cadences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossIntervalPolicy {
    /// Refuse the change outright.
    #[default]
    Reject,
    /// Accept the change but defer it to the end of the current period.
    DeferToPeriodEnd,
}

/// Immediate adjustment for a price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationAmounts {
    pub total_days: i64,
    pub days_remaining: i64,
    /// Unused share of the current price.
    pub unused_credit: i64,
    /// Share of the new price for the remaining days.
    pub new_charge: i64,
    /// `new_charge - unused_credit`. Positive is owed by the customer.
    pub net_amount: i64,
}

/// Outcome of a proration calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proration {
    Immediate(ProrationAmounts),
    /// No time remains (or the period is empty); the change applies at
    /// period end with no immediate charge.
    Deferred,
}

impl Proration {
    pub fn net_amount(&self) -> i64 {
        match self {
            Proration::Immediate(amounts) => amounts.net_amount,
            Proration::Deferred => 0,
        }
    }
}

/// Calculates proration, rejecting cadence changes.
///
/// # Errors
///
/// Returns `ValidationError` when currencies differ or the prices bill on
/// different cadences.
pub fn calculate_proration(
    current_price: &Price,
    new_price: &Price,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
) -> Result<Proration, ValidationError> {
    calculate_proration_with(
        current_price,
        new_price,
        period_start,
        period_end,
        now,
        CrossIntervalPolicy::Reject,
    )
}

/// Calculates proration under an explicit cross-interval policy.
pub fn calculate_proration_with(
    current_price: &Price,
    new_price: &Price,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
    policy: CrossIntervalPolicy,
) -> Result<Proration, ValidationError> {
    if current_price.currency != new_price.currency {
        return Err(ValidationError::invalid_format(
            "currency",
            format!(
                "cannot prorate between {} and {}",
                current_price.currency, new_price.currency
            ),
        ));
    }

    if !current_price.same_cadence(new_price) {
        return match policy {
            CrossIntervalPolicy::Reject => Err(ValidationError::invalid_format(
                "interval",
                format!(
                    "cannot prorate from every {} {} to every {} {}",
                    current_price.interval_count(),
                    current_price.interval,
                    new_price.interval_count(),
                    new_price.interval
                ),
            )),
            CrossIntervalPolicy::DeferToPeriodEnd => Ok(Proration::Deferred),
        };
    }

    let total_days = period_end.ceil_days_since(&period_start);
    let days_remaining = period_end.ceil_days_since(&now).min(total_days);

    if total_days <= 0 || days_remaining <= 0 {
        return Ok(Proration::Deferred);
    }

    let unused_credit = prorate(current_price.unit_amount(), days_remaining, total_days)?;
    let new_charge = prorate(new_price.unit_amount(), days_remaining, total_days)?;

    Ok(Proration::Immediate(ProrationAmounts {
        total_days,
        days_remaining,
        unused_credit,
        new_charge,
        net_amount: new_charge - unused_credit,
    }))
}

/// `round(amount * days / total)`, half away from zero.
fn prorate(amount: i64, days: i64, total: i64) -> Result<i64, ValidationError> {
    let numerator = i128::from(amount) * i128::from(days);
    let total = i128::from(total);
    let doubled = 2 * numerator;
    let rounded = if doubled >= 0 {
        (doubled + total) / (2 * total)
    } else {
        (doubled - total) / (2 * total)
    };
    i64::try_from(rounded)
        .map_err(|_| ValidationError::invalid_format("unit_amount", "proration overflow"))
}
