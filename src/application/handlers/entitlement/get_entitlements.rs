//! GetEntitlementsHandler - What a subscription currently grants.

use tracing::{debug, warn};

use crate::application::BillingContext;
use crate::domain::entitlement::{resolve, EntitlementSet};
use crate::domain::foundation::SubscriptionId;
use crate::domain::BillingError;

use super::super::shared;

/// Query handler resolving plan and add-on grants.
///
/// Subscriptions without access (canceled or paused) resolve to the empty set.
pub struct GetEntitlementsHandler {
    ctx: BillingContext,
}

impl GetEntitlementsHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<EntitlementSet, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, subscription_id).await?;
        if !subscription.status.has_access() {
            debug!(subscription_id = %subscription.id, status = %subscription.status, "no access granted");
            return Ok(EntitlementSet::empty());
        }

        let plan = shared::load_plan(&self.ctx, &subscription.plan_id).await?;
        let add_ons = self
            .ctx
            .catalog
            .find_add_ons(&subscription.add_on_ids)
            .await
            .map_err(BillingError::from_storage)?;
        if add_ons.len() < subscription.add_on_ids.len() {
            warn!(
                subscription_id = %subscription.id,
                expected = subscription.add_on_ids.len(),
                found = add_ons.len(),
                "assigned add-ons missing from catalog"
            );
        }

        Ok(resolve(&plan, &add_ons))
    }
}
