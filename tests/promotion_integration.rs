//! Integration tests for promo code redemption under concurrency and
//! through subscription checkout.

mod common;

use billing_core::application::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, RedeemPromoCodesCommand,
    RedeemPromoCodesHandler,
};
use billing_core::domain::foundation::{PlanId, PriceId};
use billing_core::domain::promotion::{Discount, NormalizedCode, PromoCode};
use billing_core::domain::ErrorKind;
use billing_core::ports::PromoCodeRepository;

use common::{customer, usd, Harness};

async fn save(harness: &Harness, promo: PromoCode) -> PromoCode {
    harness.promo_codes.save(&promo).await.unwrap();
    promo
}

fn redeem(n: usize, code: &str) -> RedeemPromoCodesCommand {
    RedeemPromoCodesCommand {
        customer_id: customer(n),
        codes: vec![code.to_string()],
        amount: 10_000,
        currency: usd(),
        plan_id: None,
        interval: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_never_exceed_global_limit() {
    let harness = Harness::new().await;
    let promo = save(
        &harness,
        PromoCode::new(
            NormalizedCode::try_new("launch").unwrap(),
            Discount::percentage(50).unwrap(),
        )
        .with_max_redemptions(5),
    )
    .await;

    let attempts = (0..20).map(|n| {
        let handler = RedeemPromoCodesHandler::new(harness.ctx.clone());
        tokio::spawn(async move { handler.handle(redeem(n, "launch")).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 5);

    let stored = harness
        .promo_codes
        .find_by_code(&promo.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.current_redemptions, 5);
    assert_eq!(
        harness.events.events_of_type("promo_code.redeemed").len(),
        5
    );
}

#[tokio::test]
async fn checkout_applies_stacked_codes_to_first_invoice() {
    let harness = Harness::new().await;
    save(
        &harness,
        PromoCode::new(
            NormalizedCode::try_new("tenoff").unwrap(),
            Discount::percentage(10).unwrap(),
        )
        .stackable(),
    )
    .await;
    save(
        &harness,
        PromoCode::new(
            NormalizedCode::try_new("flat500").unwrap(),
            Discount::fixed_amount(500, Some(usd())).unwrap(),
        )
        .stackable(),
    )
    .await;
    harness.payments.add_card(&customer(1));

    let mut cmd = CreateSubscriptionCommand::new(customer(1), PriceId::new("price_pro").unwrap());
    cmd.promo_codes = vec!["TENOFF".to_string(), "flat500".to_string()];
    let result = CreateSubscriptionHandler::new(harness.ctx.clone())
        .handle(cmd)
        .await
        .unwrap();

    assert_eq!(result.subscription.plan_id, PlanId::new("pro").unwrap());
    let invoice = result.invoice.unwrap();
    assert_eq!(invoice.subtotal, 10_000);
    assert_eq!(invoice.total, 8_500);
    assert_eq!(invoice.discounts.len(), 2);
    assert_eq!(invoice.discounts[0].amount, 1_000);
    assert_eq!(invoice.discounts[1].amount, 500);
    assert_eq!(harness.payments.collected_amount(), invoice.total);
    assert_eq!(
        harness.events.events_of_type("promo_code.redeemed").len(),
        2
    );
    assert!(harness.events.has_event("subscription.created"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_checkouts_share_single_use_code_once() {
    let harness = Harness::new().await;
    let promo = save(
        &harness,
        PromoCode::new(
            NormalizedCode::try_new("halfoff").unwrap(),
            Discount::percentage(50).unwrap(),
        )
        .with_max_redemptions(1),
    )
    .await;
    harness.payments.add_card(&customer(1));
    harness.payments.add_card(&customer(2));

    let checkout = |n: usize| {
        let handler = CreateSubscriptionHandler::new(harness.ctx.clone());
        let mut cmd =
            CreateSubscriptionCommand::new(customer(n), PriceId::new("price_pro").unwrap());
        cmd.promo_codes = vec!["halfoff".to_string()];
        async move { handler.handle(cmd).await }
    };
    let (first, second) = tokio::join!(checkout(1), checkout(2));

    let results = [first, second];
    let discounted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(discounted.len(), 1);
    let invoice = discounted[0].invoice.as_ref().unwrap();
    assert_eq!(invoice.total, 5_000);
    let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(rejected.kind(), ErrorKind::Validation);

    assert_eq!(harness.payments.successful_charges(), 1);
    assert_eq!(harness.payments.collected_amount(), 5_000);
    let stored = harness
        .promo_codes
        .find_by_code(&promo.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.current_redemptions, 1);
    assert_eq!(
        harness.events.events_of_type("promo_code.redeemed").len(),
        1
    );
}
