use crate::{
    config::AppConfig,
    entities::{
        category, order, order_address, order_item, payment, OrderItemStatus, PaymentMethod,
        PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{to_minor_units, GatewayOrder, PaymentGateway},
    services::{
        cart::{get_or_create_cart, price_cart, PricedCartLine},
        coupons,
        payments::{PaymentOutcome, PaymentService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Checkout orchestrator.
///
/// Turns the current cart into an immutable order snapshot: re-validates
/// stock and coupon under a transaction, apportions the coupon discount
/// across lines, persists order + items + address + payment atomically, and
/// kicks off payment confirmation for methods that settle immediately.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<PaymentService>,
}

/// Shipping address supplied at checkout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 100))]
    pub recipient_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 60))]
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderInput {
    pub address: AddressInput,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

/// What the client gets back from checkout. For gateway payments the
/// `gateway_order` carries the id the hosted payment page needs; for COD and
/// wallet the payment has already been driven to its final state.
#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: payment::Model,
    pub gateway_order: Option<GatewayOrder>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            gateway,
            payments,
        }
    }

    /// Places an order from the user's cart.
    #[instrument(skip(self, input), fields(method = ?input.payment_method))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        input.address.validate()?;

        // Price the cart outside the transaction; everything is re-checked
        // under the transaction before money is recorded.
        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let view = price_cart(&*self.db, &self.config, &cart).await?;

        let valid_lines: Vec<&PricedCartLine> =
            view.lines.iter().filter(|l| l.available).collect();
        if valid_lines.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        for line in &valid_lines {
            if line.item.quantity > line.stock_count {
                return Err(ServiceError::InsufficientStock(format!(
                    "insufficient stock for {}",
                    line.product_name
                )));
            }
        }

        let subtotal = view.totals.subtotal;
        let offer_discount = view.totals.discount;

        let coupon = match &input.coupon_code {
            Some(code) => {
                Some(coupons::find_valid_coupon(&*self.db, code, subtotal, Utc::now()).await?)
            }
            None => None,
        };
        let coupon_discount = coupon
            .as_ref()
            .map(|c| coupons::coupon_discount_amount(c, subtotal, offer_discount).round_dp(4))
            .unwrap_or(Decimal::ZERO);

        // The coupon shrinks the taxable amount but not the delivery basis:
        // the fee waiver keys off what the offers priced the cart at.
        let delivery = view.totals.delivery;

        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", &order_id.to_string()[..8].to_uppercase());

        // Apportion the coupon across lines proportionally to line subtotal,
        // assigning the rounding remainder to the last line so the shares sum
        // exactly to the order-level discount.
        let mut item_models = Vec::with_capacity(valid_lines.len());
        let mut allocated = Decimal::ZERO;
        let mut tax_total = Decimal::ZERO;
        let mut items_total = Decimal::ZERO;
        let tax_rate = self.config.tax_rate();
        let last = valid_lines.len() - 1;

        for (i, line) in valid_lines.iter().enumerate() {
            let line_coupon = if coupon_discount.is_zero() {
                Decimal::ZERO
            } else if i == last {
                coupon_discount - allocated
            } else {
                (line.line_subtotal * coupon_discount / subtotal).round_dp(4)
            };
            allocated += line_coupon;

            let line_taxable = line.line_subtotal - line.line_discount - line_coupon;
            let line_tax = (line_taxable * tax_rate).round_dp(4);
            let line_total = line_taxable + line_tax;
            tax_total += line_tax;
            items_total += line_total;

            let category_name = self.category_name(line.category_id).await?;

            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.item.product_id),
                variant_id: Set(line.item.variant_id),
                product_name: Set(line.product_name.clone()),
                category_name: Set(category_name),
                quantity: Set(line.item.quantity),
                unit_price: Set(line.unit_price),
                unit_selling_price: Set(line.unit_selling_price),
                discount: Set(line.line_discount),
                coupon_discount: Set(line_coupon),
                tax_amount: Set(line_tax),
                total: Set(line_total),
                status: Set(OrderItemStatus::Pending),
                cancel_reason: Set(None),
                shipped_at: Set(None),
                out_for_delivery_at: Set(None),
                delivered_at: Set(None),
                cancelled_at: Set(None),
                refunded_at: Set(None),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            });
        }

        let total_amount = (items_total + delivery).max(Decimal::ZERO);

        if input.payment_method == PaymentMethod::Cod
            && total_amount > self.config.cod_ceiling()
        {
            return Err(ServiceError::ValidationError(format!(
                "Cash on delivery is not available for orders above {}",
                self.config.cod_ceiling()
            )));
        }

        // Gateway orders are created before the local transaction: a gateway
        // failure must not leave an order row behind, and a local rollback
        // merely strands an unpaid gateway order.
        let gateway_order = if input.payment_method == PaymentMethod::Gateway {
            Some(
                self.gateway
                    .create_order(
                        to_minor_units(total_amount),
                        &self.config.currency,
                        &order_number,
                    )
                    .await?,
            )
        } else {
            None
        };

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            sub_total: Set(subtotal),
            total_discount: Set(offer_discount),
            coupon_discount: Set(coupon_discount),
            shipping_charge: Set(delivery),
            tax: Set(tax_total),
            total_amount: Set(total_amount),
            coupon_id: Set(coupon.as_ref().map(|c| c.id)),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let order = order_model.insert(&txn).await?;

        let mut items = Vec::with_capacity(item_models.len());
        for item in item_models {
            items.push(item.insert(&txn).await?);
        }

        let address = order_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            recipient_name: Set(input.address.recipient_name),
            phone: Set(input.address.phone),
            line1: Set(input.address.line1),
            line2: Set(input.address.line2),
            city: Set(input.address.city),
            state: Set(input.address.state),
            postal_code: Set(input.address.postal_code),
            country: Set(input.address.country),
        };
        address.insert(&txn).await?;

        let payment_model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            method: Set(input.payment_method),
            status: Set(PaymentStatus::Pending),
            amount: Set(total_amount),
            transaction_id: Set(gateway_order.as_ref().map(|g| g.id.clone())),
            error_message: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let mut payment = payment_model.insert(&txn).await?;

        // Usage is re-checked under the transaction so a concurrent checkout
        // cannot take the last slot twice.
        if let Some(coupon) = &coupon {
            coupons::reserve_usage(&txn, coupon.id).await?;
        }

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        info!(order_number = %order_number, total = %total_amount, "order placed");

        // COD and wallet settle immediately; the gateway path completes
        // later through the signed callback.
        match input.payment_method {
            PaymentMethod::Cod => {
                self.payments.confirm_cod(order_id).await?;
            }
            PaymentMethod::Wallet => {
                if let PaymentOutcome::Failed { reason } =
                    self.payments.confirm_wallet(order_id).await?
                {
                    info!(order_id = %order_id, reason = %reason, "wallet payment failed");
                }
            }
            PaymentMethod::Gateway => {}
        }

        // Reload rows the confirmation step may have advanced.
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        if let Some(fresh) = payment::Entity::find_by_id(payment.id)
            .one(&*self.db)
            .await?
        {
            payment = fresh;
        }

        Ok(CheckoutOutcome {
            order,
            items,
            payment,
            gateway_order,
        })
    }

    async fn category_name(&self, category_id: Uuid) -> Result<String, ServiceError> {
        let cat = category::Entity::find_by_id(category_id)
            .one(&*self.db)
            .await?;
        Ok(cat.map_or_else(|| "Uncategorized".to_string(), |c| c.name))
    }
}
