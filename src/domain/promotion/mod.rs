//! Promotion domain module.
//!
//! # Module Structure
//!
//! - `code` - Normalized promo code text
//! - `promo_code` - PromoCode record, conditions, and redemption rules
//! - `discount` - Discount arithmetic and stacking
//! - `events` - Redemption event

mod code;
mod discount;
mod events;
mod promo_code;

pub use code::{NormalizedCode, MAX_CODE_LEN, MIN_CODE_LEN};
pub use discount::{
    effective_codes, quote, AppliedDiscount, Discount, DiscountQuote, StackingMode, StackingOrder,
};
pub use events::PromoCodeRedeemed;
pub use promo_code::{Condition, PromoCode, PromoRejection, RedemptionContext, RedemptionResult};
