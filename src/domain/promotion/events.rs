use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, DomainEvent, EventId, PromoCodeId, Timestamp};

use super::NormalizedCode;

/// A redemption was committed against a promo code's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeRedeemed {
    pub event_id: EventId,
    pub promo_code_id: PromoCodeId,
    pub code: NormalizedCode,
    pub customer_id: CustomerId,
    pub discount_amount: i64,
    /// Counter value after this redemption.
    pub current_redemptions: u32,
    pub occurred_at: Timestamp,
}

impl DomainEvent for PromoCodeRedeemed {
    fn event_type(&self) -> &'static str {
        "promo_code.redeemed"
    }

    fn aggregate_id(&self) -> String {
        self.promo_code_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "PromoCode"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}
