//! Handler test bed: in-memory adapters wired into a `BillingContext`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::{
    InMemoryCatalog, InMemoryEventBus, InMemoryInvoiceRepository, InMemoryPromoCodeRepository,
    InMemorySubscriptionRepository, ManualClock, MockPaymentProvider,
};
use crate::application::BillingContext;
use crate::config::BillingConfig;
use crate::domain::catalog::{AddOn, GrantSet, Plan, Price, UNLIMITED};
use crate::domain::foundation::{
    AddOnId, BillingInterval, Currency, CustomerId, PlanId, PriceId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::Subscription;
use crate::ports::{
    CatalogRepository, Payment, PaymentError, PaymentMethod, PaymentProvider, PaymentRequest,
    SubscriptionRepository,
};

/// 2024-06-01T00:00:00Z; June has 30 days.
pub(crate) fn start() -> Timestamp {
    Timestamp::from_unix_secs(1_717_200_000).unwrap()
}

pub(crate) fn customer() -> CustomerId {
    CustomerId::new("cus_1").unwrap()
}

pub(crate) fn plan_id(id: &str) -> PlanId {
    PlanId::new(id).unwrap()
}

pub(crate) fn price_id(id: &str) -> PriceId {
    PriceId::new(id).unwrap()
}

pub(crate) fn usd() -> Currency {
    Currency::try_new("USD").unwrap()
}

pub(crate) struct TestBed {
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub catalog: Arc<InMemoryCatalog>,
    pub promo_codes: Arc<InMemoryPromoCodeRepository>,
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub payments: Arc<MockPaymentProvider>,
    pub events: Arc<InMemoryEventBus>,
    pub clock: Arc<ManualClock>,
    pub ctx: BillingContext,
}

impl TestBed {
    pub async fn new() -> Self {
        Self::with_config(BillingConfig::default()).await
    }

    /// Seeds `pro` (price_pro 10000/month, price_pro_yearly 100000/year),
    /// `enterprise` (price_ent 20000/month), `basic` (price_basic 5000/month)
    /// and the `extra_seats` add-on. `cus_1` has a card on file.
    pub async fn with_config(config: BillingConfig) -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let promo_codes = Arc::new(InMemoryPromoCodeRepository::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let events = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(start()));

        let ctx = BillingContext {
            subscriptions: subscriptions.clone(),
            catalog: catalog.clone(),
            promo_codes: promo_codes.clone(),
            invoices: invoices.clone(),
            payments: payments.clone(),
            events: events.clone(),
            clock: clock.clone(),
            config,
        };

        let bed = Self {
            subscriptions,
            catalog,
            promo_codes,
            invoices,
            payments,
            events,
            clock,
            ctx,
        };
        bed.seed_catalog().await;
        bed.payments.add_card(&customer());
        bed
    }

    async fn seed_catalog(&self) {
        let pro = Plan::new(
            plan_id("pro"),
            "Pro",
            GrantSet::new()
                .with_entitlement("api_access")
                .with_limit("seats", 5)
                .unwrap(),
        );
        let enterprise = Plan::new(
            plan_id("enterprise"),
            "Enterprise",
            GrantSet::new()
                .with_entitlement("api_access")
                .with_entitlement("sso")
                .with_limit("seats", UNLIMITED)
                .unwrap(),
        );
        let basic = Plan::new(
            plan_id("basic"),
            "Basic",
            GrantSet::new().with_limit("seats", 1).unwrap(),
        );
        for plan in [&pro, &enterprise, &basic] {
            self.catalog.save_plan(plan).await.unwrap();
        }

        let prices = [
            monthly("price_pro", "pro", 10_000),
            monthly("price_ent", "enterprise", 20_000),
            monthly("price_basic", "basic", 5_000),
            Price::new(
                price_id("price_pro_yearly"),
                plan_id("pro"),
                100_000,
                usd(),
                BillingInterval::Year,
                1,
            )
            .unwrap(),
        ];
        for price in &prices {
            self.catalog.save_price(price).await.unwrap();
        }

        let seats = AddOn::new(
            AddOnId::new("extra_seats").unwrap(),
            "Extra seats",
            GrantSet::new().with_limit("seats", 20).unwrap(),
        );
        self.catalog.save_add_on(&seats).await.unwrap();
    }

    /// Active `pro` subscription for `cus_1`, period June 1 to July 1.
    pub async fn active_subscription(&self) -> Subscription {
        let subscription = Subscription::new_active(
            SubscriptionId::new(),
            customer(),
            plan_id("pro"),
            price_id("price_pro"),
            start(),
            start().add_days(30),
        )
        .unwrap();
        self.subscriptions.insert(&subscription).await.unwrap();
        subscription
    }

    /// Stores an arbitrary subscription value as-is.
    pub async fn put(&self, subscription: &Subscription) {
        self.subscriptions.insert(subscription).await.unwrap();
    }

    pub async fn stored(&self, id: &SubscriptionId) -> Subscription {
        self.subscriptions.find_by_id(id).await.unwrap().unwrap()
    }

    /// Context whose first charge is preceded by `edit` being committed to
    /// the subscription, as if a user request landed mid-charge.
    pub fn ctx_writing_during_charge(
        &self,
        subscription_id: SubscriptionId,
        edit: fn(&mut Subscription),
    ) -> BillingContext {
        let provider = WriteDuringCharge {
            inner: self.payments.clone(),
            subscriptions: self.subscriptions.clone(),
            subscription_id,
            edit,
            fired: AtomicBool::new(false),
        };
        BillingContext {
            payments: Arc::new(provider),
            ..self.ctx.clone()
        }
    }
}

struct WriteDuringCharge {
    inner: Arc<MockPaymentProvider>,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    subscription_id: SubscriptionId,
    edit: fn(&mut Subscription),
    fired: AtomicBool,
}

#[async_trait]
impl PaymentProvider for WriteDuringCharge {
    async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let current = self
                .subscriptions
                .find_by_id(&self.subscription_id)
                .await
                .unwrap()
                .unwrap();
            let mut edited = current.clone();
            (self.edit)(&mut edited);
            self.subscriptions
                .compare_and_swap(current.version, &edited)
                .await
                .unwrap();
        }
        self.inner.create_payment(request).await
    }

    async fn default_payment_method(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        self.inner.default_payment_method(customer_id).await
    }
}

fn monthly(id: &str, plan: &str, amount: i64) -> Price {
    Price::new(
        price_id(id),
        plan_id(plan),
        amount,
        usd(),
        BillingInterval::Month,
        1,
    )
    .unwrap()
}
