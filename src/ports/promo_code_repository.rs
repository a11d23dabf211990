//! Promo code repository port.
//!
//! Redemption counters only move through `redeem_if_below_limit`, which
//! must check both limits and increment in one atomic step.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, PromoCodeId};
use crate::domain::promotion::{NormalizedCode, PromoCode, RedemptionResult};

#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    /// Insert or replace a promo code definition.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if another record already uses the same code text
    async fn save(&self, promo_code: &PromoCode) -> Result<(), DomainError>;

    async fn find_by_code(&self, code: &NormalizedCode) -> Result<Option<PromoCode>, DomainError>;

    /// How many times `customer_id` has redeemed the code.
    async fn customer_redemptions(
        &self,
        id: &PromoCodeId,
        customer_id: &CustomerId,
    ) -> Result<u32, DomainError>;

    /// Atomically increments the global and per-customer counters if both
    /// are still below their limits.
    ///
    /// # Errors
    ///
    /// - `PromoCodeNotFound` if the id is unknown
    async fn redeem_if_below_limit(
        &self,
        id: &PromoCodeId,
        customer_id: &CustomerId,
    ) -> Result<RedemptionResult, DomainError>;
}
