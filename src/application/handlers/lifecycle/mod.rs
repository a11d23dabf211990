//! Lifecycle handlers - scheduled processing of due subscriptions.

mod process_lifecycle;

pub use process_lifecycle::{ProcessLifecycleHandler, ProcessSummary};
