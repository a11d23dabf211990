//! Subscription domain events.
//!
//! Every state machine transition emits exactly one of these. Events are
//! named in past tense and routed by `event_type()`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{
    CustomerId, DomainEvent, EventId, InvoiceId, PlanId, PriceId, SubscriptionId, Timestamp,
};

use super::SubscriptionStatus;

/// Why a subscription moved to `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Customer asked for immediate cancellation.
    Voluntary,
    /// A scheduled cancellation reached period end.
    PeriodEnd,
    /// A trial ended without converting.
    TrialEnded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Voluntary => write!(f, "voluntary"),
            CancelReason::PeriodEnd => write!(f, "period_end"),
            CancelReason::TrialEnded => write!(f, "trial_ended"),
        }
    }
}

/// Transition-specific event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Created {
        plan_id: PlanId,
        price_id: PriceId,
        status: SubscriptionStatus,
        trial_end: Option<Timestamp>,
        invoice_id: Option<InvoiceId>,
    },

    /// Trialing → Active after the first charge.
    TrialConverted {
        period_start: Timestamp,
        period_end: Timestamp,
        amount: i64,
        invoice_id: InvoiceId,
    },

    /// Active → Active for a new period.
    Renewed {
        period_start: Timestamp,
        period_end: Timestamp,
        amount: i64,
        invoice_id: InvoiceId,
    },

    /// A collection attempt was declined.
    RenewalFailed {
        attempt: u32,
        failure_code: String,
        next_retry_at: Option<Timestamp>,
    },

    /// PastDue/GracePeriod → Active.
    PaymentRecovered {
        period_start: Timestamp,
        period_end: Timestamp,
        amount: i64,
        invoice_id: InvoiceId,
    },

    /// Retries exhausted; service continues until `grace_period_ends_at`.
    GracePeriodStarted {
        attempt: u32,
        failure_code: String,
        grace_period_ends_at: Timestamp,
        next_retry_at: Option<Timestamp>,
    },

    /// GracePeriod → CanceledNonpayment after the final attempt failed.
    CanceledNonpayment { attempt: u32, failure_code: String },

    Canceled { reason: CancelReason },

    /// Cancellation deferred to `effective_at`.
    CancelScheduled { effective_at: Timestamp },

    /// A scheduled cancellation was withdrawn.
    Reactivated,

    Paused,

    Resumed,

    PlanChanged {
        from_plan_id: PlanId,
        from_price_id: PriceId,
        to_plan_id: PlanId,
        to_price_id: PriceId,
        /// Positive when charged now, negative when credited.
        net_amount: i64,
        invoice_id: Option<InvoiceId>,
    },

    /// A payment collected while the subscription changed underneath it,
    /// kept as account credit.
    PaymentCredited { amount: i64, invoice_id: InvoiceId },

    PlanChangeScheduled {
        to_plan_id: PlanId,
        to_price_id: PriceId,
        effective_at: Timestamp,
    },
}

/// Event emitted by a subscription transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub kind: SubscriptionEventKind,
}

impl SubscriptionEvent {
    pub fn new(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        occurred_at: Timestamp,
        kind: SubscriptionEventKind,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id,
            customer_id,
            occurred_at,
            kind,
        }
    }
}

impl SubscriptionEventKind {
    /// Returns the event type string for routing and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEventKind::Created { .. } => "subscription.created",
            SubscriptionEventKind::TrialConverted { .. } => "subscription.trial_converted",
            SubscriptionEventKind::Renewed { .. } => "subscription.renewed",
            SubscriptionEventKind::RenewalFailed { .. } => "subscription.renewal_failed",
            SubscriptionEventKind::PaymentRecovered { .. } => "subscription.payment_recovered",
            SubscriptionEventKind::GracePeriodStarted { .. } => {
                "subscription.grace_period_started"
            }
            SubscriptionEventKind::CanceledNonpayment { .. } => {
                "subscription.canceled_nonpayment"
            }
            SubscriptionEventKind::Canceled { .. } => "subscription.canceled",
            SubscriptionEventKind::CancelScheduled { .. } => "subscription.cancel_scheduled",
            SubscriptionEventKind::Reactivated => "subscription.reactivated",
            SubscriptionEventKind::Paused => "subscription.paused",
            SubscriptionEventKind::Resumed => "subscription.resumed",
            SubscriptionEventKind::PlanChanged { .. } => "subscription.plan_changed",
            SubscriptionEventKind::PaymentCredited { .. } => "subscription.payment_credited",
            SubscriptionEventKind::PlanChangeScheduled { .. } => {
                "subscription.plan_change_scheduled"
            }
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EventEnvelope;

    fn event(kind: SubscriptionEventKind) -> SubscriptionEvent {
        SubscriptionEvent::new(
            SubscriptionId::new(),
            CustomerId::new("cus_1").unwrap(),
            Timestamp::from_unix_secs(1_717_200_000).unwrap(),
            kind,
        )
    }

    #[test]
    fn event_types_are_namespaced() {
        assert_eq!(
            event(SubscriptionEventKind::Paused).event_type(),
            "subscription.paused"
        );
        assert_eq!(
            event(SubscriptionEventKind::Canceled {
                reason: CancelReason::TrialEnded
            })
            .event_type(),
            "subscription.canceled"
        );
    }

    #[test]
    fn envelope_payload_is_flat_and_tagged() {
        let evt = event(SubscriptionEventKind::RenewalFailed {
            attempt: 2,
            failure_code: "insufficient_funds".to_string(),
            next_retry_at: None,
        });

        let envelope = EventEnvelope::from_event(&evt).unwrap();
        assert_eq!(envelope.event_type, "subscription.renewal_failed");
        assert_eq!(envelope.aggregate_type, "Subscription");
        assert_eq!(envelope.payload["type"], "renewal_failed");
        assert_eq!(envelope.payload["attempt"], 2);
        assert_eq!(envelope.payload["customer_id"], "cus_1");
    }

    #[test]
    fn envelope_payload_deserializes_back() {
        let evt = event(SubscriptionEventKind::Canceled {
            reason: CancelReason::PeriodEnd,
        });
        let envelope = EventEnvelope::from_event(&evt).unwrap();
        let back: SubscriptionEvent = envelope.payload_as().unwrap();
        assert_eq!(back, evt);
    }

    #[test]
    fn cancel_reason_displays_snake_case() {
        assert_eq!(CancelReason::TrialEnded.to_string(), "trial_ended");
    }
}
