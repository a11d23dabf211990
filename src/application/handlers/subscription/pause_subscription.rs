//! PauseSubscriptionHandler - Suspends and resumes subscriptions.
//!
//! A paused subscription is never due and grants no entitlements.

use tracing::info;

use crate::application::BillingContext;
use crate::domain::foundation::{EventMetadata, SubscriptionId};
use crate::domain::subscription::{machine, Subscription};
use crate::domain::BillingError;

use super::super::shared;

pub struct PauseSubscriptionHandler {
    ctx: BillingContext,
}

impl PauseSubscriptionHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn pause(&self, subscription_id: &SubscriptionId) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, subscription_id).await?;
        let transition = machine::pause(&subscription, self.ctx.clock.now())?;
        let stored = shared::commit(
            &self.ctx,
            subscription.version,
            transition,
            EventMetadata::default(),
        )
        .await?;
        info!(subscription_id = %stored.id, "subscription paused");
        Ok(stored)
    }

    /// Resumes on the existing period dates.
    pub async fn resume(&self, subscription_id: &SubscriptionId) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, subscription_id).await?;
        let transition = machine::resume(&subscription, self.ctx.clock.now())?;
        let stored = shared::commit(
            &self.ctx,
            subscription.version,
            transition,
            EventMetadata::default(),
        )
        .await?;
        info!(subscription_id = %stored.id, "subscription resumed");
        Ok(stored)
    }
}
