//! Subscription status state machine.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial running; first charge at trial end.
    Trialing,

    /// Paid and current.
    Active,

    /// Renewal failed; scheduled retries pending.
    PastDue,

    /// Retries exhausted; service continues until the grace window closes.
    GracePeriod,

    /// Suspended by the customer. Never due for processing.
    Paused,

    /// Ended voluntarily, at period end, or at trial end.
    Canceled,

    /// Ended because payment could not be collected.
    CanceledNonpayment,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access to entitlements.
    ///
    /// Dunning states keep access while collection is attempted.
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing
                | SubscriptionStatus::Active
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::GracePeriod
        )
    }

    /// Returns true while payment collection is being retried.
    pub fn is_dunning(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::PastDue | SubscriptionStatus::GracePeriod
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::GracePeriod => "grace_period",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::CanceledNonpayment => "canceled_nonpayment",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From TRIALING
            (Trialing, Active)
                | (Trialing, PastDue)
                | (Trialing, Canceled)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, GracePeriod)
                | (Active, Paused)
                | (Active, Canceled)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, PastDue)
                | (PastDue, GracePeriod)
                | (PastDue, Canceled)
            // From GRACE_PERIOD
                | (GracePeriod, Active)
                | (GracePeriod, GracePeriod)
                | (GracePeriod, CanceledNonpayment)
                | (GracePeriod, Canceled)
            // From PAUSED
                | (Paused, Active)
                | (Paused, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trialing => vec![Active, PastDue, Canceled],
            Active => vec![Active, PastDue, GracePeriod, Paused, Canceled],
            PastDue => vec![Active, PastDue, GracePeriod, Canceled],
            GracePeriod => vec![Active, GracePeriod, CanceledNonpayment, Canceled],
            Paused => vec![Active, Canceled],
            Canceled | CanceledNonpayment => vec![],
        }
    }
}
