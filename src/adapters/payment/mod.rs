//! Payment provider adapters.
//!
//! Processor integrations live outside the core (a relay implements
//! `PaymentProvider`); this module ships the scripted test double.

mod mock_payment_provider;

pub use mock_payment_provider::{MockOutcome, MockPaymentProvider};
