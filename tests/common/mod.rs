//! Shared wiring for integration tests: in-memory adapters behind a
//! `BillingContext`, with a small seeded catalog.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;

use billing_core::adapters::{
    InMemoryCatalog, InMemoryEventBus, InMemoryInvoiceRepository, InMemoryPromoCodeRepository,
    InMemorySubscriptionRepository, ManualClock, MockPaymentProvider,
};
use billing_core::application::BillingContext;
use billing_core::config::BillingConfig;
use billing_core::domain::catalog::{GrantSet, Plan, Price};
use billing_core::domain::foundation::{
    BillingInterval, Currency, CustomerId, PlanId, PriceId, SubscriptionId, Timestamp,
};
use billing_core::domain::subscription::Subscription;
use billing_core::ports::{
    CatalogRepository, Payment, PaymentError, PaymentMethod, PaymentProvider, PaymentRequest,
    SubscriptionRepository,
};

/// 2024-06-01T00:00:00Z
pub fn june_first() -> Timestamp {
    Timestamp::from_unix_secs(1_717_200_000).unwrap()
}

pub fn customer(n: usize) -> CustomerId {
    CustomerId::new(format!("cus_{}", n)).unwrap()
}

pub fn usd() -> Currency {
    Currency::try_new("USD").unwrap()
}

pub struct Harness {
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub catalog: Arc<InMemoryCatalog>,
    pub promo_codes: Arc<InMemoryPromoCodeRepository>,
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub payments: Arc<MockPaymentProvider>,
    pub events: Arc<InMemoryEventBus>,
    pub clock: Arc<ManualClock>,
    pub ctx: BillingContext,
}

impl Harness {
    /// Seeds plan `pro` with `price_pro` at 10000/month.
    pub async fn new() -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let promo_codes = Arc::new(InMemoryPromoCodeRepository::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let events = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(june_first()));

        let ctx = BillingContext {
            subscriptions: subscriptions.clone(),
            catalog: catalog.clone(),
            promo_codes: promo_codes.clone(),
            invoices: invoices.clone(),
            payments: payments.clone(),
            events: events.clone(),
            clock: clock.clone(),
            config: BillingConfig::default(),
        };

        let plan = Plan::new(
            PlanId::new("pro").unwrap(),
            "Pro",
            GrantSet::new()
                .with_entitlement("api_access")
                .with_limit("seats", 5)
                .unwrap(),
        );
        catalog.save_plan(&plan).await.unwrap();
        let price = Price::new(
            PriceId::new("price_pro").unwrap(),
            plan.id.clone(),
            10_000,
            usd(),
            BillingInterval::Month,
            1,
        )
        .unwrap();
        catalog.save_price(&price).await.unwrap();

        Self {
            subscriptions,
            catalog,
            promo_codes,
            invoices,
            payments,
            events,
            clock,
            ctx,
        }
    }

    /// Active subscription for `customer(n)` billed June 1 to July 1, with a card on file.
    pub async fn subscribe(&self, n: usize) -> Subscription {
        let customer_id = customer(n);
        self.payments.add_card(&customer_id);
        let subscription = Subscription::new_active(
            SubscriptionId::new(),
            customer_id,
            PlanId::new("pro").unwrap(),
            PriceId::new("price_pro").unwrap(),
            june_first(),
            june_first().add_days(30),
        )
        .unwrap();
        self.subscriptions.insert(&subscription).await.unwrap();
        subscription
    }

    pub async fn stored(&self, id: &SubscriptionId) -> Subscription {
        self.subscriptions.find_by_id(id).await.unwrap().unwrap()
    }
}

/// Holds every charge until `parties` charges are in flight, then lets the
/// mock processor settle them in arrival order.
pub struct GatedProvider {
    inner: Arc<MockPaymentProvider>,
    gate: Barrier,
}

impl GatedProvider {
    pub fn new(inner: Arc<MockPaymentProvider>, parties: usize) -> Self {
        Self {
            inner,
            gate: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl PaymentProvider for GatedProvider {
    async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentError> {
        self.gate.wait().await;
        self.inner.create_payment(request).await
    }

    async fn default_payment_method(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        self.inner.default_payment_method(customer_id).await
    }
}

impl Harness {
    /// Context whose charges wait for each other at a two-party gate.
    pub fn gated_ctx(&self) -> BillingContext {
        BillingContext {
            payments: Arc::new(GatedProvider::new(self.payments.clone(), 2)),
            ..self.ctx.clone()
        }
    }
}
