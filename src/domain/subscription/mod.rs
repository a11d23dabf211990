//! Subscription domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate entity
//! - `status` - SubscriptionStatus state machine
//! - `events` - Events emitted by transitions
//! - `machine` - Pure transition functions driven by time and payment outcomes

mod aggregate;
mod events;
pub mod machine;
mod status;

pub use aggregate::{PendingPlanChange, Subscription};
pub use events::{CancelReason, SubscriptionEvent, SubscriptionEventKind};
pub use machine::{ChargeOutcome, DunningPolicy, LifecycleAction, RenewalCharge, Transition};
pub use status::SubscriptionStatus;
