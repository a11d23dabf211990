//! In-memory promo code store with atomic guarded redemption.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, PromoCodeId};
use crate::domain::promotion::{NormalizedCode, PromoCode, RedemptionResult};
use crate::ports::PromoCodeRepository;

#[derive(Debug, Default)]
struct PromoState {
    codes: HashMap<PromoCodeId, PromoCode>,
    by_code: HashMap<NormalizedCode, PromoCodeId>,
    per_customer: HashMap<(PromoCodeId, CustomerId), u32>,
}

/// Promo codes held in memory.
///
/// Both counters of a redemption move under one write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromoCodeRepository {
    state: Arc<RwLock<PromoState>>,
}

impl InMemoryPromoCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromoCodeRepository for InMemoryPromoCodeRepository {
    async fn save(&self, promo_code: &PromoCode) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.by_code.get(&promo_code.code) {
            if existing != &promo_code.id {
                return Err(DomainError::new(
                    ErrorCode::AlreadyExists,
                    format!("Promo code {} already exists", promo_code.code),
                ));
            }
        }
        // Counters are owned by the store once a code exists.
        let mut record = promo_code.clone();
        if let Some(stored) = state.codes.get(&promo_code.id) {
            record.current_redemptions = stored.current_redemptions;
        }
        state.by_code.insert(record.code.clone(), record.id);
        state.codes.insert(record.id, record);
        Ok(())
    }

    async fn find_by_code(&self, code: &NormalizedCode) -> Result<Option<PromoCode>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .by_code
            .get(code)
            .and_then(|id| state.codes.get(id))
            .cloned())
    }

    async fn customer_redemptions(
        &self,
        id: &PromoCodeId,
        customer_id: &CustomerId,
    ) -> Result<u32, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .per_customer
            .get(&(*id, customer_id.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn redeem_if_below_limit(
        &self,
        id: &PromoCodeId,
        customer_id: &CustomerId,
    ) -> Result<RedemptionResult, DomainError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let promo = state.codes.get_mut(id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::PromoCodeNotFound,
                format!("Promo code {} not found", id),
            )
            .with_detail("id", id.to_string())
        })?;

        if !promo.has_remaining_redemptions() {
            return Ok(RedemptionResult::GlobalLimitReached);
        }
        let key = (*id, customer_id.clone());
        let used = state.per_customer.get(&key).copied().unwrap_or(0);
        if !promo.customer_may_redeem(used) {
            return Ok(RedemptionResult::CustomerLimitReached);
        }

        promo.current_redemptions += 1;
        state.per_customer.insert(key, used + 1);
        Ok(RedemptionResult::Redeemed {
            current_redemptions: promo.current_redemptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::promotion::Discount;

    fn code(text: &str) -> NormalizedCode {
        NormalizedCode::try_new(text).unwrap()
    }

    fn customer(id: &str) -> CustomerId {
        CustomerId::new(id).unwrap()
    }

    #[tokio::test]
    async fn find_by_code_uses_normalized_text() {
        let repo = InMemoryPromoCodeRepository::new();
        let promo = PromoCode::new(code("SPRING"), Discount::percentage(10).unwrap());
        repo.save(&promo).await.unwrap();

        let found = repo.find_by_code(&code(" spring ")).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(promo.id));
    }

    #[tokio::test]
    async fn duplicate_code_text_is_rejected() {
        let repo = InMemoryPromoCodeRepository::new();
        repo.save(&PromoCode::new(code("DUP"), Discount::percentage(10).unwrap()))
            .await
            .unwrap();
        let err = repo
            .save(&PromoCode::new(code("DUP"), Discount::percentage(20).unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn redemption_stops_at_global_limit() {
        let repo = InMemoryPromoCodeRepository::new();
        let promo =
            PromoCode::new(code("LIMITED"), Discount::percentage(10).unwrap()).with_max_redemptions(2);
        repo.save(&promo).await.unwrap();

        assert_eq!(
            repo.redeem_if_below_limit(&promo.id, &customer("a")).await.unwrap(),
            RedemptionResult::Redeemed {
                current_redemptions: 1
            }
        );
        repo.redeem_if_below_limit(&promo.id, &customer("b")).await.unwrap();
        assert_eq!(
            repo.redeem_if_below_limit(&promo.id, &customer("c")).await.unwrap(),
            RedemptionResult::GlobalLimitReached
        );
    }

    #[tokio::test]
    async fn redemption_stops_at_customer_limit() {
        let repo = InMemoryPromoCodeRepository::new();
        let promo = PromoCode::new(code("ONCE"), Discount::percentage(10).unwrap())
            .with_max_redemptions_per_customer(1);
        repo.save(&promo).await.unwrap();

        repo.redeem_if_below_limit(&promo.id, &customer("a")).await.unwrap();
        assert_eq!(
            repo.redeem_if_below_limit(&promo.id, &customer("a")).await.unwrap(),
            RedemptionResult::CustomerLimitReached
        );
        assert_eq!(repo.customer_redemptions(&promo.id, &customer("a")).await.unwrap(), 1);
        assert_eq!(repo.customer_redemptions(&promo.id, &customer("b")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resaving_a_code_keeps_its_counter() {
        let repo = InMemoryPromoCodeRepository::new();
        let promo = PromoCode::new(code("KEEP"), Discount::percentage(10).unwrap());
        repo.save(&promo).await.unwrap();
        repo.redeem_if_below_limit(&promo.id, &customer("a")).await.unwrap();

        repo.save(&promo).await.unwrap();
        let stored = repo.find_by_code(&code("KEEP")).await.unwrap().unwrap();
        assert_eq!(stored.current_redemptions, 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = InMemoryPromoCodeRepository::new();
        let err = repo
            .redeem_if_below_limit(&PromoCodeId::new(), &customer("a"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PromoCodeNotFound);
    }
}
