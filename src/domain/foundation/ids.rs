//! Strongly-typed identifier value objects.
//!
//! Two families exist:
//! - UUID identifiers for records this core creates (subscriptions, invoices, promo codes)
//! - String identifiers for records owned by collaborators (customers, catalog entries,
//!   processor payments), which only need to be non-empty

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Namespace for deterministic invoice identifiers.
const INVOICE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_9a44_4d2b_8c1e_53f0_a7d9_0b11);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting blank values.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a subscription.
    SubscriptionId
);

uuid_id!(
    /// Unique identifier for an invoice.
    InvoiceId
);

uuid_id!(
    /// Unique identifier for a promo code record.
    PromoCodeId
);

impl InvoiceId {
    /// Derives a stable invoice id from a billing idempotency key.
    ///
    /// Repeated processing of the same billing event produces the same
    /// invoice id, so saving it twice overwrites rather than duplicates.
    pub fn for_idempotency_key(key: &str) -> Self {
        Self(Uuid::new_v5(&INVOICE_NAMESPACE, key.as_bytes()))
    }
}

string_id!(
    /// Customer identifier, owned by the host application.
    CustomerId,
    "customer_id"
);

string_id!(
    /// Catalog plan identifier.
    PlanId,
    "plan_id"
);

string_id!(
    /// Catalog price identifier.
    PriceId,
    "price_id"
);

string_id!(
    /// Catalog add-on identifier.
    AddOnId,
    "add_on_id"
);

string_id!(
    /// Catalog product identifier (groups plans).
    ProductId,
    "product_id"
);

string_id!(
    /// Payment identifier assigned by the payment processor.
    PaymentId,
    "payment_id"
);

string_id!(
    /// Stored payment method identifier at the payment processor.
    PaymentMethodId,
    "payment_method_id"
);
