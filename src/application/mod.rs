//! Application layer - Commands, Queries, and Handlers.
//!
//! Handlers orchestrate the pure domain functions against the ports held
//! by a [`BillingContext`]. Each handler owns a clone of the context.

mod context;
pub mod handlers;

pub use context::BillingContext;

pub use handlers::{
    // Lifecycle
    ProcessLifecycleHandler, ProcessSummary,
    // Subscriptions
    ApplyAt, CancelSubscriptionCommand, CancelSubscriptionHandler, ChangePlanCommand,
    ChangePlanHandler, CreateSubscriptionCommand, CreateSubscriptionHandler,
    CreateSubscriptionResult, PauseSubscriptionHandler, ProrationBehavior,
    ReactivateSubscriptionCommand, RetryPaymentCommand, RetryPaymentHandler,
    // Promotions
    QuotePromoCodesCommand, QuotePromoCodesHandler, RedeemPromoCodesCommand,
    RedeemPromoCodesHandler, RedeemPromoCodesResult,
    // Billing
    ChargeCustomerCommand, ChargeCustomerHandler, ChargeCustomerResult,
    // Entitlements
    GetEntitlementsHandler,
};
