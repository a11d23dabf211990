//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;
pub mod entitlement;
pub mod lifecycle;
pub mod promotion;
mod shared;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use billing::{ChargeCustomerCommand, ChargeCustomerHandler, ChargeCustomerResult};
pub use entitlement::GetEntitlementsHandler;
pub use lifecycle::{ProcessLifecycleHandler, ProcessSummary};
pub use promotion::{
    QuotePromoCodesCommand, QuotePromoCodesHandler, RedeemPromoCodesCommand,
    RedeemPromoCodesHandler, RedeemPromoCodesResult,
};
pub use shared::NO_PAYMENT_METHOD;
pub use subscription::{
    ApplyAt, CancelSubscriptionCommand, CancelSubscriptionHandler, ChangePlanCommand,
    ChangePlanHandler, CreateSubscriptionCommand, CreateSubscriptionHandler,
    CreateSubscriptionResult, PauseSubscriptionHandler, ProrationBehavior,
    ReactivateSubscriptionCommand, RetryPaymentCommand, RetryPaymentHandler,
};
