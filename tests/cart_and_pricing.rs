mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use storefront_api::{errors::ServiceError, services::cart::AddToCartInput};
use uuid::Uuid;

#[tokio::test]
async fn category_offer_reprices_variant() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Footwear").await;
    let product = create_product(&app.db, category.id, "Trail Runner").await;
    let variant = create_variant(&app.db, product.id, "TR-42", dec!(500), dec!(500), 10).await;

    create_category_offer(&app.db, category.id, dec!(10)).await;

    let updated = app
        .services
        .pricing
        .reprice_variant(variant.id)
        .await
        .unwrap();
    assert_eq!(updated.selling_price, dec!(450));
}

#[tokio::test]
async fn cart_totals_below_free_shipping_threshold() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 10).await;
    let user = Uuid::new_v4();

    let view = app
        .services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(view.totals.subtotal, dec!(900));
    assert_eq!(view.totals.discount, Decimal::ZERO);
    assert_eq!(view.totals.tax, dec!(27.00));
    assert_eq!(view.totals.delivery, dec!(99));
    assert_eq!(view.totals.total, dec!(1026.00));
}

#[tokio::test]
async fn quantity_cap_rejects_oversized_line() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 100).await;
    let user = Uuid::new_v4();

    let err = app
        .services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity: 6,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn repeated_adds_accumulate_against_the_cap() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 100).await;
    let user = Uuid::new_v4();

    let input = || AddToCartInput {
        product_id: product.id,
        variant_id: variant.id,
        quantity: 3,
    };
    app.services.cart.add_item(user, input()).await.unwrap();
    let err = app.services.cart.add_item(user, input()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn stock_limits_cart_quantity() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 2).await;
    let user = Uuid::new_v4();

    let err = app
        .services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity: 3,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn deactivated_product_is_excluded_from_totals_but_kept_in_cart() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let prod = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, prod.id, "FG-1", dec!(300), dec!(300), 10).await;
    let user = Uuid::new_v4();

    app.services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: prod.id,
                variant_id: variant.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let mut active = prod.into_active_model();
    active.is_active = Set(false);
    active.update(&*app.db).await.unwrap();

    let view = app.services.cart.get_cart(user).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert!(!view.lines[0].available);
    assert_eq!(view.totals.subtotal, Decimal::ZERO);
    assert_eq!(view.totals.delivery, Decimal::ZERO);
}

#[tokio::test]
async fn zero_quantity_update_is_rejected() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 10).await;
    let user = Uuid::new_v4();

    let view = app
        .services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let item_id = view.lines[0].item.id;

    let err = app
        .services
        .cart
        .update_item_quantity(user, item_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn removing_an_item_empties_the_cart() {
    let app = TestApp::new().await;
    let category = create_category(&app.db, "Books").await;
    let product = create_product(&app.db, category.id, "Field Guide").await;
    let variant = create_variant(&app.db, product.id, "FG-1", dec!(300), dec!(300), 10).await;
    let user = Uuid::new_v4();

    let view = app
        .services
        .cart
        .add_item(
            user,
            AddToCartInput {
                product_id: product.id,
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let view = app
        .services
        .cart
        .remove_item(user, view.lines[0].item.id)
        .await
        .unwrap();
    assert!(view.lines.is_empty());
    assert_eq!(view.totals.total, Decimal::ZERO);
}
