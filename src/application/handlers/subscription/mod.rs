//! Subscription handlers - customer-driven changes to a single subscription.

mod cancel_subscription;
mod change_plan;
mod create_subscription;
mod pause_subscription;
mod retry_payment;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ReactivateSubscriptionCommand,
};
pub use change_plan::{ApplyAt, ChangePlanCommand, ChangePlanHandler, ProrationBehavior};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use pause_subscription::PauseSubscriptionHandler;
pub use retry_payment::{RetryPaymentCommand, RetryPaymentHandler};
