//! Catalog module - what a customer can subscribe to.
//!
//! Plans carry capability grants, prices carry the money and cadence, and
//! add-ons layer extra grants on top of a plan. All of them are immutable
//! once referenced by a subscription, apart from deactivation.

mod grants;
mod plan;
mod price;

pub use grants::{GrantSet, UNLIMITED};
pub use plan::{AddOn, Plan};
pub use price::Price;
