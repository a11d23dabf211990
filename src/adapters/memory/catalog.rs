//! In-memory catalog.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::catalog::{AddOn, Plan, Price};
use crate::domain::foundation::{AddOnId, DomainError, ErrorCode, PlanId, PriceId};
use crate::ports::CatalogRepository;

#[derive(Debug, Default)]
struct CatalogState {
    plans: HashMap<PlanId, Plan>,
    prices: HashMap<PriceId, Price>,
    add_ons: HashMap<AddOnId, AddOn>,
}

/// Plans, prices and add-ons held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn save_plan(&self, plan: &Plan) -> Result<(), DomainError> {
        self.state
            .write()
            .await
            .plans
            .insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn save_price(&self, price: &Price) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if !state.plans.contains_key(&price.plan_id) {
            return Err(DomainError::new(
                ErrorCode::PlanNotFound,
                format!("Price {} references unknown plan {}", price.id, price.plan_id),
            )
            .with_detail("id", price.plan_id.to_string()));
        }
        state.prices.insert(price.id.clone(), price.clone());
        Ok(())
    }

    async fn save_add_on(&self, add_on: &AddOn) -> Result<(), DomainError> {
        self.state
            .write()
            .await
            .add_ons
            .insert(add_on.id.clone(), add_on.clone());
        Ok(())
    }

    async fn find_plan(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(self.state.read().await.plans.get(id).cloned())
    }

    async fn find_price(&self, id: &PriceId) -> Result<Option<Price>, DomainError> {
        Ok(self.state.read().await.prices.get(id).cloned())
    }

    async fn find_add_on(&self, id: &AddOnId) -> Result<Option<AddOn>, DomainError> {
        Ok(self.state.read().await.add_ons.get(id).cloned())
    }

    async fn find_add_ons(&self, ids: &[AddOnId]) -> Result<Vec<AddOn>, DomainError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.add_ons.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::GrantSet;
    use crate::domain::foundation::{BillingInterval, Currency};

    fn price(plan: &str) -> Price {
        Price::new(
            PriceId::new("price_pro").unwrap(),
            PlanId::new(plan).unwrap(),
            10_000,
            Currency::try_new("USD").unwrap(),
            BillingInterval::Month,
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn price_requires_known_plan() {
        let catalog = InMemoryCatalog::new();
        let err = catalog.save_price(&price("pro")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanNotFound);

        catalog
            .save_plan(&Plan::new(PlanId::new("pro").unwrap(), "Pro", GrantSet::new()))
            .await
            .unwrap();
        catalog.save_price(&price("pro")).await.unwrap();

        let found = catalog
            .find_price(&PriceId::new("price_pro").unwrap())
            .await
            .unwrap();
        assert_eq!(found, Some(price("pro")));
    }

    #[tokio::test]
    async fn find_add_ons_keeps_order_and_skips_unknown() {
        let catalog = InMemoryCatalog::new();
        let a = AddOn::new(AddOnId::new("seats").unwrap(), "Seats", GrantSet::new());
        let b = AddOn::new(AddOnId::new("sso").unwrap(), "SSO", GrantSet::new());
        catalog.save_add_on(&a).await.unwrap();
        catalog.save_add_on(&b).await.unwrap();

        let found = catalog
            .find_add_ons(&[
                b.id.clone(),
                AddOnId::new("missing").unwrap(),
                a.id.clone(),
            ])
            .await
            .unwrap();
        assert_eq!(found, vec![b, a]);
    }
}
