use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AddOnId, PlanId, ProductId};

use super::GrantSet;

/// A subscribable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    /// Product family this plan belongs to, used for promo applicability.
    pub product_id: Option<ProductId>,
    pub grants: GrantSet,
    /// Inactive plans accept no new subscriptions or plan changes.
    pub active: bool,
}

impl Plan {
    pub fn new(id: PlanId, name: impl Into<String>, grants: GrantSet) -> Self {
        Self {
            id,
            name: name.into(),
            product_id: None,
            grants,
            active: true,
        }
    }

    pub fn with_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Administrative deactivation. Existing subscriptions are unaffected.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// Extra grants attachable to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub id: AddOnId,
    pub name: String,
    pub grants: GrantSet,
    pub active: bool,
}

impl AddOn {
    pub fn new(id: AddOnId, name: impl Into<String>, grants: GrantSet) -> Self {
        Self {
            id,
            name: name.into(),
            grants,
            active: true,
        }
    }
}
