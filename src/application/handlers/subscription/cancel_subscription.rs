//! CancelSubscriptionHandler - Customer cancellation and reactivation.

use tracing::info;

use crate::application::BillingContext;
use crate::domain::foundation::{EventMetadata, SubscriptionId};
use crate::domain::subscription::{machine, Subscription};
use crate::domain::BillingError;

use super::super::shared;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    /// Keep access until the current period ends instead of ending now.
    pub at_period_end: bool,
}

/// Command to withdraw a scheduled cancellation.
#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

/// Handler for cancelling subscriptions.
///
/// A period-end cancellation is executed by the lifecycle run once the
/// period is over; until then it can be withdrawn with `reactivate`.
pub struct CancelSubscriptionHandler {
    ctx: BillingContext,
}

impl CancelSubscriptionHandler {
    pub fn new(ctx: BillingContext) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, cmd: CancelSubscriptionCommand) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, &cmd.subscription_id).await?;
        let now = self.ctx.clock.now();
        let transition = machine::cancel(&subscription, cmd.at_period_end, now)?;

        let stored = shared::commit(
            &self.ctx,
            subscription.version,
            transition,
            EventMetadata::default(),
        )
        .await?;
        info!(
            subscription_id = %stored.id,
            at_period_end = cmd.at_period_end,
            status = %stored.status,
            "subscription cancellation requested"
        );
        Ok(stored)
    }

    pub async fn reactivate(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<Subscription, BillingError> {
        let subscription = shared::load_subscription(&self.ctx, &cmd.subscription_id).await?;
        let transition = machine::reactivate(&subscription, self.ctx.clock.now())?;

        let stored = shared::commit(
            &self.ctx,
            subscription.version,
            transition,
            EventMetadata::default(),
        )
        .await?;
        info!(subscription_id = %stored.id, "scheduled cancellation withdrawn");
        Ok(stored)
    }
}
