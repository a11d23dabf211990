//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types that form the
//! vocabulary of the billing domain.

mod errors;
mod events;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, EventMetadata, SCHEMA_VERSION};
pub use ids::{
    AddOnId, CustomerId, InvoiceId, PaymentId, PaymentMethodId, PlanId, PriceId, ProductId,
    PromoCodeId, SubscriptionId,
};
pub use money::{BillingInterval, Currency};
pub use state_machine::StateMachine;
pub use timestamp::{Timestamp, SECONDS_PER_DAY};
