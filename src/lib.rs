//! billing-core - Subscription lifecycle and billing computation.
//!
//! Decides what state a recurring subscription is in as time passes and
//! payments succeed or fail, what a mid-cycle plan change costs, how promo
//! codes combine, and which capabilities a customer currently holds.
//!
//! The crate owns no network or storage: everything external is reached
//! through the traits in [`ports`].

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
