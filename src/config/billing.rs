//! Billing lifecycle configuration

use serde::{Deserialize, Deserializer};

use crate::domain::proration::CrossIntervalPolicy;
use crate::domain::promotion::StackingOrder;
use crate::domain::subscription::DunningPolicy;

use super::error::ConfigValidationError;

/// Dunning, batching and pricing policies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BillingConfig {
    /// Days of continued access after retries are exhausted
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// Day offsets from the first failure at which payment is retried
    #[serde(
        default = "default_retry_intervals",
        deserialize_with = "deserialize_day_offsets"
    )]
    pub retry_intervals: Vec<u32>,

    /// Maximum subscriptions handled per `process_all` call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Charge automatically when a trial ends
    #[serde(default = "default_auto_convert_trials")]
    pub auto_convert_trials: bool,

    #[serde(default)]
    pub cross_interval_policy: CrossIntervalPolicy,

    #[serde(default)]
    pub stacking_order: StackingOrder,
}

fn default_grace_period_days() -> u32 {
    7
}

fn default_retry_intervals() -> Vec<u32> {
    vec![1, 3, 5]
}

/// Accepts `[1, 3, 5]`, `5`, or the environment form `"1,3,5"`.
fn deserialize_day_offsets<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DayOffsets {
        List(Vec<u32>),
        One(u32),
        Text(String),
    }

    match DayOffsets::deserialize(deserializer)? {
        DayOffsets::List(days) => Ok(days),
        DayOffsets::One(day) => Ok(vec![day]),
        DayOffsets::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>().map_err(serde::de::Error::custom))
            .collect(),
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_auto_convert_trials() -> bool {
    true
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            retry_intervals: default_retry_intervals(),
            batch_size: default_batch_size(),
            auto_convert_trials: default_auto_convert_trials(),
            cross_interval_policy: CrossIntervalPolicy::default(),
            stacking_order: StackingOrder::default(),
        }
    }
}

impl BillingConfig {
    /// The policy the state machine applies.
    pub fn dunning_policy(&self) -> DunningPolicy {
        DunningPolicy {
            retry_intervals: self.retry_intervals.clone(),
            grace_period_days: self.grace_period_days,
            auto_convert_trials: self.auto_convert_trials,
        }
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.retry_intervals.is_empty() {
            return Err(ConfigValidationError::NoRetryIntervals);
        }
        if self.retry_intervals.contains(&0) {
            return Err(ConfigValidationError::NonPositiveRetryInterval);
        }
        if self.retry_intervals.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigValidationError::DecreasingRetryIntervals);
        }
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}
