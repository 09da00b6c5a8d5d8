use crate::{
    config::AppConfig,
    entities::{
        cart, cart_item, order, order_item, payment, product_variant, Cart, CartItem, Order,
        OrderItem, OrderItemStatus, Payment, PaymentMethod, PaymentStatus, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{to_minor_units, verify_signature, GatewayOrder, GatewayPaymentState, PaymentGateway},
    services::{coupons, wallet},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Payment confirmation state machine.
///
/// Drives a payment from `pending` to `completed` or `failed`. Stock is
/// committed (decremented) only here, at confirmation time, so an abandoned
/// gateway checkout never holds inventory. Completion and its side effects
/// (stock commit, cart clear) happen in one transaction; failure releases the
/// coupon reservation and nothing else, since nothing else was taken.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    gateway: Arc<dyn PaymentGateway>,
}

/// Callback body posted by the gateway after the hosted payment flow.
/// All fields are optional on the wire; absence fails verification.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCallback {
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
}

/// Result of a confirmation attempt. Verification failures are outcomes,
/// not errors: the payment row records them and the client may retry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Completed,
    AlreadyConfirmed,
    Failed { reason: String },
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            gateway,
        }
    }

    /// Confirms a cash-on-delivery order: commits stock and clears the cart.
    /// The payment row stays `pending` until the courier collects at the
    /// door; delivery of the last item completes it.
    #[instrument(skip(self))]
    pub async fn confirm_cod(&self, order_id: Uuid) -> Result<PaymentOutcome, ServiceError> {
        let (order, payment) = self.load(order_id).await?;
        self.require_method(&payment, PaymentMethod::Cod)?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        if items.iter().all(|i| i.status != OrderItemStatus::Pending) {
            return Ok(PaymentOutcome::AlreadyConfirmed);
        }

        let txn = self.db.begin().await?;
        commit_stock(&txn, order_id).await?;
        let cleared_cart = clear_cart(&txn, order.user_id).await?;
        txn.commit().await?;

        if let Some(cart_id) = cleared_cart {
            self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        }
        info!(order_number = %order.order_number, "cash-on-delivery order confirmed");
        Ok(PaymentOutcome::Completed)
    }

    /// Confirms a gateway payment from the signed callback.
    ///
    /// Verification is sequential: fields present, order correlation,
    /// HMAC signature, then a server-side fetch that must report the payment
    /// as captured. The first failed step marks the payment failed and
    /// releases the coupon; no further steps run.
    #[instrument(skip(self, callback))]
    pub async fn confirm_gateway(
        &self,
        order_id: Uuid,
        callback: GatewayCallback,
    ) -> Result<PaymentOutcome, ServiceError> {
        let (order, payment) = self.load(order_id).await?;
        self.require_method(&payment, PaymentMethod::Gateway)?;

        if payment.status == PaymentStatus::Completed {
            return Ok(PaymentOutcome::AlreadyConfirmed);
        }
        let retrying = payment.status == PaymentStatus::Failed;

        let (gw_order_id, gw_payment_id, signature) = match (
            callback.gateway_order_id,
            callback.gateway_payment_id,
            callback.signature,
        ) {
            (Some(o), Some(p), Some(s)) => (o, p, s),
            _ => {
                return self
                    .fail(&order, payment, "Callback is missing required fields")
                    .await;
            }
        };

        if payment.transaction_id.as_deref() != Some(gw_order_id.as_str()) {
            return self
                .fail(&order, payment, "Callback does not match this order")
                .await;
        }

        if !verify_signature(
            &self.config.gateway_key_secret,
            &gw_order_id,
            &gw_payment_id,
            &signature,
        ) {
            return self.fail(&order, payment, "Invalid signature").await;
        }

        let state = match self.gateway.fetch_payment(&gw_payment_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "gateway verification fetch failed");
                return self
                    .fail(&order, payment, "Payment could not be verified")
                    .await;
            }
        };
        if state != GatewayPaymentState::Captured {
            return self.fail(&order, payment, "Payment was not captured").await;
        }

        let txn = self.db.begin().await?;

        // A callback arriving after a failure re-takes the coupon slot the
        // failure released.
        if retrying {
            if let Some(coupon_id) = order.coupon_id {
                coupons::reserve_usage(&txn, coupon_id).await?;
            }
        }

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Completed);
        active.transaction_id = Set(Some(gw_payment_id.clone()));
        active.error_message = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        commit_stock(&txn, order_id).await?;
        let cleared_cart = clear_cart(&txn, order.user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentCompleted {
                order_id,
                transaction_id: gw_payment_id,
            })
            .await;
        if let Some(cart_id) = cleared_cart {
            self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        }
        info!(order_number = %order.order_number, "gateway payment completed");
        Ok(PaymentOutcome::Completed)
    }

    /// Confirms a wallet payment by debiting the user's wallet. Insufficient
    /// balance is a failed outcome, not an error. A payment that previously
    /// failed may be confirmed again once the wallet has been topped up.
    #[instrument(skip(self))]
    pub async fn confirm_wallet(&self, order_id: Uuid) -> Result<PaymentOutcome, ServiceError> {
        let (order, payment) = self.load(order_id).await?;
        self.require_method(&payment, PaymentMethod::Wallet)?;

        if payment.status == PaymentStatus::Completed {
            return Ok(PaymentOutcome::AlreadyConfirmed);
        }
        let retrying = payment.status == PaymentStatus::Failed;

        let txn = self.db.begin().await?;

        let entry = match wallet::debit(
            &txn,
            order.user_id,
            payment.amount,
            Some(order_id),
            &format!("Payment for order {}", order.order_number),
        )
        .await
        {
            Ok(entry) => entry,
            Err(ServiceError::PaymentFailed(reason)) => {
                txn.rollback().await?;
                return self.fail(&order, payment, &reason).await;
            }
            Err(e) => return Err(e),
        };

        // A retry re-takes the coupon slot that the earlier failure released.
        if retrying {
            if let Some(coupon_id) = order.coupon_id {
                coupons::reserve_usage(&txn, coupon_id).await?;
            }
        }

        let amount = payment.amount;
        let wallet_id = entry.wallet_id;
        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Completed);
        active.transaction_id = Set(Some(entry.id.to_string()));
        active.error_message = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        commit_stock(&txn, order_id).await?;
        let cleared_cart = clear_cart(&txn, order.user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WalletDebited { wallet_id, amount })
            .await;
        self.event_sender
            .send_or_log(Event::PaymentCompleted {
                order_id,
                transaction_id: entry.id.to_string(),
            })
            .await;
        if let Some(cart_id) = cleared_cart {
            self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        }
        info!(order_number = %order.order_number, "wallet payment completed");
        Ok(PaymentOutcome::Completed)
    }

    /// Restarts a failed gateway payment: creates a fresh gateway order for
    /// the same (never re-priced) amount and moves the payment back to
    /// `pending`, re-reserving the coupon the failure released.
    #[instrument(skip(self))]
    pub async fn retry_payment(&self, order_id: Uuid) -> Result<GatewayOrder, ServiceError> {
        let (order, payment) = self.load(order_id).await?;
        self.require_method(&payment, PaymentMethod::Gateway)?;

        if payment.status != PaymentStatus::Failed {
            return Err(ServiceError::InvalidOperation(
                "Only a failed payment can be retried".to_string(),
            ));
        }

        let gateway_order = self
            .gateway
            .create_order(
                to_minor_units(payment.amount),
                &self.config.currency,
                &order.order_number,
            )
            .await?;

        let txn = self.db.begin().await?;

        if let Some(coupon_id) = order.coupon_id {
            coupons::reserve_usage(&txn, coupon_id).await?;
        }

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Pending);
        active.transaction_id = Set(Some(gateway_order.id.clone()));
        active.error_message = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_number = %order.order_number, "payment retry started");
        Ok(gateway_order)
    }

    /// Payment record for an order.
    pub async fn get_payment(&self, order_id: Uuid) -> Result<payment::Model, ServiceError> {
        let (_, payment) = self.load(order_id).await?;
        Ok(payment)
    }

    /// Marks the payment failed and releases the coupon reservation. The
    /// coupon is released only on the first transition out of `pending`;
    /// repeated failures must not drive `used_count` below its true value.
    async fn fail(
        &self,
        order: &order::Model,
        payment: payment::Model,
        reason: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        let first_failure = payment.status == PaymentStatus::Pending;

        let txn = self.db.begin().await?;

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Failed);
        active.error_message = Set(Some(reason.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        if first_failure {
            if let Some(coupon_id) = order.coupon_id {
                coupons::release_usage(&txn, coupon_id).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                order_id: order.id,
                reason: reason.to_string(),
            })
            .await;
        warn!(order_number = %order.order_number, reason = %reason, "payment failed");
        Ok(PaymentOutcome::Failed {
            reason: reason.to_string(),
        })
    }

    async fn load(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, payment::Model), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment for order {} not found", order_id))
            })?;

        Ok((order, payment))
    }

    fn require_method(
        &self,
        payment: &payment::Model,
        method: PaymentMethod,
    ) -> Result<(), ServiceError> {
        if payment.method != method {
            return Err(ServiceError::InvalidOperation(format!(
                "Order was not placed with {:?} payment",
                method
            )));
        }
        Ok(())
    }
}

/// Commits stock for every pending line of the order: decrements variant
/// stock and advances the line to `processing`. Runs inside the caller's
/// transaction; an insufficient-stock error rolls the whole confirmation
/// back.
pub(crate) async fn commit_stock<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for item in items {
        if item.status != OrderItemStatus::Pending {
            continue;
        }

        let variant = ProductVariant::find_by_id(item.variant_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", item.variant_id))
            })?;

        if variant.stock_count < item.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "insufficient stock for {}",
                item.product_name
            )));
        }

        let new_stock = variant.stock_count - item.quantity;
        let mut variant: product_variant::ActiveModel = variant.into();
        variant.stock_count = Set(new_stock);
        variant.updated_at = Set(Utc::now());
        variant.update(conn).await?;

        let mut item: order_item::ActiveModel = item.into();
        item.status = Set(OrderItemStatus::Processing);
        item.updated_at = Set(Utc::now());
        item.update(conn).await?;
    }

    Ok(())
}

/// Empties the user's cart after a confirmed purchase. The cart row itself
/// survives; only its lines go. Returns the cart id for event publication.
pub(crate) async fn clear_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<Uuid>, ServiceError> {
    let cart = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?;

    let Some(cart) = cart else {
        return Ok(None);
    };

    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    Ok(Some(cart.id))
}

/// Completes a pending cash-on-delivery payment once the last item is
/// delivered. Invoked by the fulfillment path inside its own transaction.
pub(crate) async fn complete_cod_payment<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let payment = Payment::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Payment for order {} not found", order_id))
        })?;

    if payment.method != PaymentMethod::Cod || payment.status != PaymentStatus::Pending {
        return Ok(());
    }

    let mut active: payment::ActiveModel = payment.into();
    active.status = Set(PaymentStatus::Completed);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}
