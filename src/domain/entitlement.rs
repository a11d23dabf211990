//! Entitlement and limit resolution.
//!
//! A subscription's capabilities are the union of its plan's grants and
//! every assigned add-on's grants. Limits take the most generous value
//! across sources, and unlimited beats any number.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::catalog::{AddOn, Plan, UNLIMITED};

/// Effective quota for one limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Limit {
    Unlimited,
    Finite(i64),
    /// No source grants this key. Distinct from a zero quota.
    NotGranted,
}

impl Limit {
    fn from_raw(value: i64) -> Self {
        if value == UNLIMITED {
            Limit::Unlimited
        } else {
            Limit::Finite(value)
        }
    }

    /// Most generous of two limits.
    fn max(self, other: Limit) -> Limit {
        match (self, other) {
            (Limit::Unlimited, _) | (_, Limit::Unlimited) => Limit::Unlimited,
            (Limit::Finite(a), Limit::Finite(b)) => Limit::Finite(a.max(b)),
            (Limit::NotGranted, other) | (other, Limit::NotGranted) => other,
        }
    }
}

/// Resolved capabilities for a subscription. Ordered for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSet {
    entitlements: BTreeSet<String>,
    limits: BTreeMap<String, Limit>,
}

impl EntitlementSet {
    /// The set granted to a subscription without access.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entitlements.contains(key)
    }

    pub fn limit(&self, key: &str) -> Limit {
        self.limits.get(key).copied().unwrap_or(Limit::NotGranted)
    }

    /// Whether recording one more unit on top of `current_usage` stays within the limit.
    pub fn check_limit(&self, key: &str, current_usage: i64) -> bool {
        match self.limit(key) {
            Limit::Unlimited => true,
            Limit::Finite(max) => current_usage < max,
            Limit::NotGranted => false,
        }
    }

    pub fn entitlements(&self) -> &BTreeSet<String> {
        &self.entitlements
    }

    pub fn limits(&self) -> &BTreeMap<String, Limit> {
        &self.limits
    }

    pub fn is_empty(&self) -> bool {
        self.entitlements.is_empty() && self.limits.is_empty()
    }
}

/// Merges plan and add-on grants.
pub fn resolve(plan: &Plan, add_ons: &[AddOn]) -> EntitlementSet {
    let mut set = EntitlementSet::default();
    let sources = std::iter::once(&plan.grants).chain(add_ons.iter().map(|a| &a.grants));

    for grants in sources {
        set.entitlements
            .extend(grants.entitlements().iter().cloned());
        for (key, value) in grants.limits() {
            let merged = set
                .limit(key)
                .max(Limit::from_raw(*value));
            set.limits.insert(key.clone(), merged);
        }
    }
    set
}
