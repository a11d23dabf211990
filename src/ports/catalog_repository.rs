//! Catalog repository port.
//!
//! The catalog is owned by the host application; the core only reads it,
//! apart from the `save_*` methods used to seed adapters.

use async_trait::async_trait;

use crate::domain::catalog::{AddOn, Plan, Price};
use crate::domain::foundation::{AddOnId, DomainError, PlanId, PriceId};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn save_plan(&self, plan: &Plan) -> Result<(), DomainError>;

    async fn save_price(&self, price: &Price) -> Result<(), DomainError>;

    async fn save_add_on(&self, add_on: &AddOn) -> Result<(), DomainError>;

    async fn find_plan(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    async fn find_price(&self, id: &PriceId) -> Result<Option<Price>, DomainError>;

    async fn find_add_on(&self, id: &AddOnId) -> Result<Option<AddOn>, DomainError>;

    /// Add-ons for the given ids, in the same order. Unknown ids are skipped.
    async fn find_add_ons(&self, ids: &[AddOnId]) -> Result<Vec<AddOn>, DomainError>;
}
