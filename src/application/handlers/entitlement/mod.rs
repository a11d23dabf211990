//! Entitlement queries.

mod get_entitlements;

pub use get_entitlements::GetEntitlementsHandler;
