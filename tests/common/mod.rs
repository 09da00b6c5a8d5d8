#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sha2::Sha256;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use storefront_api::{
    config::AppConfig,
    db,
    entities::*,
    errors::ServiceError,
    events::{process_events, EventSender},
    gateway::{GatewayOrder, GatewayPaymentState, PaymentGateway},
    services::checkout::AddressInput,
    AppServices,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway stub: records created orders and reports a configurable payment
/// state on fetch.
pub struct StubGateway {
    pub created: Mutex<Vec<GatewayOrder>>,
    pub fetch_state: Mutex<GatewayPaymentState>,
    counter: AtomicU64,
}

impl Default for StubGateway {
    fn default() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fetch_state: Mutex::new(GatewayPaymentState::Captured),
            counter: AtomicU64::new(0),
        }
    }
}

impl StubGateway {
    pub fn set_fetch_state(&self, state: GatewayPaymentState) {
        *self.fetch_state.lock().unwrap() = state;
    }

    pub fn last_order_id(&self) -> String {
        self.created
            .lock()
            .unwrap()
            .last()
            .map(|o| o.id.clone())
            .expect("no gateway order created")
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let order = GatewayOrder {
            id: format!("gw_order_{}", n),
            amount_minor,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        };
        self.created.lock().unwrap().push(order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, _payment_id: &str) -> Result<GatewayPaymentState, ServiceError> {
        Ok(*self.fetch_state.lock().unwrap())
    }
}

/// In-memory application wired against SQLite.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: Arc<AppServices>,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        // One connection: every handle must see the same in-memory database.
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Arc::new(Database::connect(opts).await.expect("sqlite connect"));
        db::create_schema(&db).await.expect("schema");

        let config = Arc::new(AppConfig::for_tests("sqlite::memory:"));

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(process_events(rx));
        let event_sender = Arc::new(EventSender::new(tx));

        let gateway = Arc::new(StubGateway::default());
        let services = Arc::new(AppServices::new(
            db.clone(),
            event_sender,
            config.clone(),
            gateway.clone(),
        ));

        Self {
            db,
            config,
            services,
            gateway,
        }
    }
}

pub async fn create_category(db: &DatabaseConnection, name: &str) -> CategoryModel {
    category::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert category")
}

pub async fn create_product(
    db: &DatabaseConnection,
    category_id: Uuid,
    name: &str,
) -> ProductModel {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(name.to_string()),
        description: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn create_variant(
    db: &DatabaseConnection,
    product_id: Uuid,
    sku: &str,
    actual_price: Decimal,
    selling_price: Decimal,
    stock: i32,
) -> ProductVariantModel {
    product_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        sku: Set(sku.to_string()),
        actual_price: Set(actual_price),
        selling_price: Set(selling_price),
        stock_count: Set(stock),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert variant")
}

pub async fn create_category_offer(
    db: &DatabaseConnection,
    category_id: Uuid,
    percentage: Decimal,
) -> OfferModel {
    offer::ActiveModel {
        id: Set(Uuid::new_v4()),
        scope: Set(OfferScope::Category),
        product_id: Set(None),
        category_id: Set(Some(category_id)),
        percentage: Set(percentage),
        status: Set(OfferStatus::Active),
        start_date: Set(Utc::now() - Duration::days(1)),
        end_date: Set(Utc::now() + Duration::days(30)),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert offer")
}

pub async fn create_coupon(
    db: &DatabaseConnection,
    code: &str,
    percentage: Decimal,
    min_amount: Decimal,
    max_amount: Option<Decimal>,
    usage_limit: i32,
) -> CouponModel {
    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        percentage: Set(percentage),
        min_amount: Set(min_amount),
        max_amount: Set(max_amount),
        usage_limit: Set(usage_limit),
        used_count: Set(0),
        expiration_date: Set(Utc::now() + Duration::days(30)),
        is_active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert coupon")
}

/// Funds a wallet directly, keeping the balance/ledger invariant intact.
pub async fn fund_wallet(db: &DatabaseConnection, user_id: Uuid, amount: Decimal) -> WalletModel {
    let wallet = wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(amount),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert wallet");

    wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        order_id: Set(None),
        order_item_id: Set(None),
        tx_type: Set(WalletTransactionType::Credit),
        status: Set(WalletTransactionStatus::Completed),
        amount: Set(amount),
        note: Set(Some("Top-up".to_string())),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert wallet entry");

    wallet
}

pub fn address() -> AddressInput {
    AddressInput {
        recipient_name: "Asha Kumar".to_string(),
        phone: "5550100200".to_string(),
        line1: "12 Harbor Lane".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
    }
}

/// Signs a callback the way the gateway would.
pub fn sign_callback(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
