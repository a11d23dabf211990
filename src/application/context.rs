//! Collaborators shared by every handler.

use std::sync::Arc;

use crate::config::BillingConfig;
use crate::ports::{
    CatalogRepository, Clock, EventPublisher, InvoiceRepository, PaymentProvider,
    PromoCodeRepository, SubscriptionRepository,
};

/// Everything a handler needs, injected by the host.
///
/// Cheap to clone; each handler keeps its own copy.
#[derive(Clone)]
pub struct BillingContext {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub promo_codes: Arc<dyn PromoCodeRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub payments: Arc<dyn PaymentProvider>,
    pub events: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
    pub config: BillingConfig,
}

impl std::fmt::Debug for BillingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
