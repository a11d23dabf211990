//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, currency, errors, events)
//! - `catalog` - Plans, prices, and add-ons
//! - `subscription` - Subscription aggregate and its state machine
//! - `proration` - Mid-cycle price change arithmetic
//! - `promotion` - Promo codes, conditions, and discount stacking
//! - `entitlement` - Capability and quota resolution
//! - `invoice` - Invoices and their status lifecycle
//! - `error` - `BillingError`, the public error taxonomy

pub mod catalog;
pub mod entitlement;
pub mod error;
pub mod foundation;
pub mod invoice;
pub mod promotion;
pub mod proration;
pub mod subscription;

pub use error::{AdapterKind, BillingError, ErrorKind};
