mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use storefront_api::{
    entities::{Coupon, OrderItemStatus, PaymentMethod, PaymentStatus, ProductVariant},
    errors::ServiceError,
    services::{cart::AddToCartInput, checkout::PlaceOrderInput},
};
use uuid::Uuid;

async fn seed_cart(
    app: &TestApp,
    user: Uuid,
    price: Decimal,
    quantity: i32,
    stock: i32,
) -> (Uuid, Uuid) {
    let category = create_category(&app.db, "Outdoors").await;
    let product = create_product(&app.db, category.id, "Camp Stove").await;
    let variant = create_variant(&app.db, product.id, "CS-1", price, price, stock).await;
    app.services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity,
            },
        )
        .await
        .unwrap();
    (product.id, variant.id)
}

fn order_input(method: PaymentMethod, coupon: Option<&str>) -> PlaceOrderInput {
    PlaceOrderInput {
        address: address(),
        payment_method: method,
        coupon_code: coupon.map(|c| c.to_string()),
    }
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let err = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, None))
        .await
        .unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => assert_eq!(msg, "Cart is empty"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn coupon_below_min_amount_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    seed_cart(&app, user, dec!(300), 3, 10).await; // subtotal 900
    create_coupon(&app.db, "BIGSPEND", dec!(10), dec!(1000), None, 5).await;

    let err = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, Some("BIGSPEND")))
        .await
        .unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => assert_eq!(msg, "Coupon not applicable"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn cod_is_refused_above_the_ceiling() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    seed_cart(&app, user, dec!(500), 3, 10).await; // subtotal 1500

    let err = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, None))
        .await
        .unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("Cash on delivery"), "got: {}", msg)
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn cod_checkout_confirms_immediately() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (_, variant_id) = seed_cart(&app, user, dec!(300), 2, 10).await; // subtotal 600

    let outcome = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, None))
        .await
        .unwrap();

    assert!(outcome.order.order_number.starts_with("ORD-"));
    assert_eq!(outcome.order.sub_total, dec!(600));
    assert_eq!(outcome.order.tax, dec!(18.00));
    assert_eq!(outcome.order.shipping_charge, dec!(99));
    assert_eq!(outcome.order.total_amount, dec!(717.00));
    assert!(outcome.gateway_order.is_none());

    // COD collects at the door: payment pending, but stock is committed and
    // the cart is cleared right away.
    assert_eq!(outcome.payment.method, PaymentMethod::Cod);
    assert_eq!(outcome.payment.status, PaymentStatus::Pending);
    assert!(outcome
        .items
        .iter()
        .all(|i| i.status == OrderItemStatus::Processing));

    let variant = ProductVariant::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.stock_count, 8);

    let cart = app.services.cart.get_cart(user).await.unwrap();
    assert!(cart.lines.is_empty());
}

#[tokio::test]
async fn coupon_is_apportioned_across_lines() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let category = create_category(&app.db, "Outdoors").await;
    let product = create_product(&app.db, category.id, "Camp Stove").await;
    let v1 = create_variant(&app.db, product.id, "CS-1", dec!(100), dec!(100), 10).await;
    let v2 = create_variant(&app.db, product.id, "CS-2", dec!(200), dec!(200), 10).await;
    for v in [&v1, &v2] {
        app.services
            .cart
            .add_item(
                user,
                AddToCartInput {
                    product_id: product.id,
                    variant_id: v.id,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
    }
    let coupon = create_coupon(&app.db, "SAVE10", dec!(10), Decimal::ZERO, None, 5).await;

    let outcome = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, Some("SAVE10")))
        .await
        .unwrap();

    // subtotal 300, coupon 30, split 10/20 by line weight
    assert_eq!(outcome.order.coupon_discount, dec!(30));
    let shares: Decimal = outcome.items.iter().map(|i| i.coupon_discount).sum();
    assert_eq!(shares, dec!(30));
    assert_eq!(outcome.items.len(), 2);
    for item in &outcome.items {
        let expected = item.unit_price * Decimal::from(item.quantity) / dec!(10);
        assert_eq!(item.coupon_discount, expected);
    }

    // Line totals plus delivery reconcile with the order total.
    let items_total: Decimal = outcome.items.iter().map(|i| i.total).sum();
    assert_eq!(
        items_total + outcome.order.shipping_charge,
        outcome.order.total_amount
    );

    let coupon = Coupon::find_by_id(coupon.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.used_count, 1);
}

#[tokio::test]
async fn exhausted_coupon_is_a_conflict() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    seed_cart(&app, user, dec!(300), 1, 10).await;

    let coupon = create_coupon(&app.db, "ONCE", dec!(10), Decimal::ZERO, None, 1).await;
    let mut active = coupon.into_active_model();
    active.used_count = Set(1);
    active.update(&*app.db).await.unwrap();

    let err = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, Some("ONCE")))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn stale_cart_stock_is_rechecked_at_checkout() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (_, variant_id) = seed_cart(&app, user, dec!(300), 2, 10).await;

    // Stock drains between carting and checkout.
    let variant = ProductVariant::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active = variant.into_active_model();
    active.stock_count = Set(1);
    active.update(&*app.db).await.unwrap();

    let err = app
        .services
        .checkout
        .place_order(user, order_input(PaymentMethod::Cod, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}
