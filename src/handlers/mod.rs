pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod returns;
pub mod wallet;

use crate::AppState;
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the full route tree over the shared application state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Cart
        .route("/cart", get(carts::get_cart))
        .route("/cart/items", post(carts::add_item))
        .route(
            "/cart/items/:item_id",
            put(carts::update_item).delete(carts::remove_item),
        )
        // Checkout
        .route("/checkout", post(checkout::place_order))
        // Orders
        .route("/orders", get(orders::list_orders))
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/cancel", post(orders::cancel_order))
        .route(
            "/orders/:order_id/items/:item_id/cancel",
            post(orders::cancel_item),
        )
        .route(
            "/orders/:order_id/items/:item_id/status",
            put(orders::update_item_status),
        )
        // Payments
        .route("/payments/:order_id", get(payments::get_payment))
        .route(
            "/payments/:order_id/callback",
            post(payments::gateway_callback),
        )
        .route("/payments/:order_id/retry", post(payments::retry_payment))
        // Returns
        .route(
            "/returns",
            get(returns::list_returns).post(returns::request_return),
        )
        .route("/returns/:request_id/approve", post(returns::approve_return))
        .route("/returns/:request_id/cancel", post(returns::cancel_return))
        // Wallet
        .route("/wallet", get(wallet::get_balance))
        .route("/wallet/transactions", get(wallet::list_transactions))
        // Pricing maintenance
        .route(
            "/pricing/variants/:variant_id/reprice",
            post(pricing::reprice_variant),
        )
        .route(
            "/pricing/products/:product_id/reprice",
            post(pricing::reprice_product),
        )
        .route(
            "/pricing/categories/:category_id/reprice",
            post(pricing::reprice_category),
        )
}
