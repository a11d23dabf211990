//! Capability grants shared by plans and add-ons.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::foundation::ValidationError;

/// Limit value meaning "no quota".
pub const UNLIMITED: i64 = -1;

/// Entitlement keys and numeric limits granted by one catalog source.
///
/// # Invariants
///
/// - Every limit is either `UNLIMITED` or non-negative
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrantSet")]
pub struct GrantSet {
    entitlements: BTreeSet<String>,
    limits: BTreeMap<String, i64>,
}

/// Unchecked wire form of `GrantSet`.
#[derive(Deserialize)]
struct RawGrantSet {
    #[serde(default)]
    entitlements: BTreeSet<String>,
    #[serde(default)]
    limits: BTreeMap<String, i64>,
}

impl TryFrom<RawGrantSet> for GrantSet {
    type Error = ValidationError;

    fn try_from(raw: RawGrantSet) -> Result<Self, Self::Error> {
        let mut grants = GrantSet {
            entitlements: raw.entitlements,
            limits: BTreeMap::new(),
        };
        for (key, value) in raw.limits {
            grants = grants.with_limit(key, value)?;
        }
        Ok(grants)
    }
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a boolean capability key.
    pub fn with_entitlement(mut self, key: impl Into<String>) -> Self {
        self.entitlements.insert(key.into());
        self
    }

    /// Adds a numeric quota.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for negative values other than `UNLIMITED`.
    pub fn with_limit(mut self, key: impl Into<String>, value: i64) -> Result<Self, ValidationError> {
        if value < UNLIMITED {
            return Err(ValidationError::out_of_range("limit", UNLIMITED, i64::MAX, value));
        }
        self.limits.insert(key.into(), value);
        Ok(self)
    }

    pub fn entitlements(&self) -> &BTreeSet<String> {
        &self.entitlements
    }

    pub fn limits(&self) -> &BTreeMap<String, i64> {
        &self.limits
    }
}
