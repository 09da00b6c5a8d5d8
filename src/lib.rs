pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod services;

use crate::{
    config::AppConfig,
    events::EventSender,
    gateway::PaymentGateway,
    services::{
        CartService, CheckoutService, OrderService, PaymentService, PricingService,
        ReturnService, WalletService,
    },
};
use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// All order-lifecycle services over one database connection pool.
pub struct AppServices {
    pub pricing: PricingService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub orders: OrderService,
    pub returns: ReturnService,
    pub wallet: WalletService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            gateway.clone(),
        ));

        Self {
            pricing: PricingService::new(db.clone(), event_sender.clone()),
            cart: CartService::new(db.clone(), event_sender.clone(), config.clone()),
            checkout: CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                config.clone(),
                gateway,
                payments.clone(),
            ),
            payments: (*payments).clone(),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            returns: ReturnService::new(db.clone(), event_sender, config),
            wallet: WalletService::new(db),
        }
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: Arc<AppServices>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = Arc::new(AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            gateway,
        ));
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Assembles the router with tracing and CORS middleware.
pub fn app(state: AppState) -> Router {
    handlers::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
