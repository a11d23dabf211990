use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    BillingInterval, Currency, PlanId, PriceId, Timestamp, ValidationError,
};

/// Upper bound on `interval_count`, which keeps period arithmetic in range.
pub const MAX_INTERVAL_COUNT: u32 = 36;

/// Recurring price attached to exactly one plan.
///
/// # Invariants
///
/// - `unit_amount >= 0` (minor currency units)
/// - `1 <= interval_count <= MAX_INTERVAL_COUNT`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub plan_id: PlanId,
    unit_amount: i64,
    pub currency: Currency,
    pub interval: BillingInterval,
    interval_count: u32,
    /// Trial length offered on new subscriptions.
    pub trial_days: Option<u32>,
    pub active: bool,
}

impl Price {
    /// Creates an active price with validated amount and interval count.
    pub fn new(
        id: PriceId,
        plan_id: PlanId,
        unit_amount: i64,
        currency: Currency,
        interval: BillingInterval,
        interval_count: u32,
    ) -> Result<Self, ValidationError> {
        if unit_amount < 0 {
            return Err(ValidationError::out_of_range(
                "unit_amount",
                0,
                i64::MAX,
                unit_amount,
            ));
        }
        if interval_count == 0 || interval_count > MAX_INTERVAL_COUNT {
            return Err(ValidationError::out_of_range(
                "interval_count",
                1,
                i64::from(MAX_INTERVAL_COUNT),
                i64::from(interval_count),
            ));
        }
        Ok(Self {
            id,
            plan_id,
            unit_amount,
            currency,
            interval,
            interval_count,
            trial_days: None,
            active: true,
        })
    }

    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_days = if days == 0 { None } else { Some(days) };
        self
    }

    pub fn unit_amount(&self) -> i64 {
        self.unit_amount
    }

    pub fn interval_count(&self) -> u32 {
        self.interval_count
    }

    /// End of a billing period starting at `start`.
    pub fn period_end_from(&self, start: Timestamp) -> Result<Timestamp, ValidationError> {
        start.add_interval(self.interval, self.interval_count)
    }

    /// True when both prices bill on the same cadence.
    pub fn same_cadence(&self, other: &Price) -> bool {
        self.interval == other.interval && self.interval_count == other.interval_count
    }
}
