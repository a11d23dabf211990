//! Adapters - Implementations of port interfaces.
//!
//! - `clock` - System and manual time sources
//! - `events` - In-memory event bus
//! - `memory` - In-memory repositories
//! - `payment` - Mock payment provider

pub mod clock;
pub mod events;
pub mod memory;
pub mod payment;

pub use clock::{ManualClock, SystemClock};
pub use events::InMemoryEventBus;
pub use memory::{
    InMemoryCatalog, InMemoryInvoiceRepository, InMemoryPromoCodeRepository,
    InMemorySubscriptionRepository,
};
pub use payment::{MockOutcome, MockPaymentProvider};
