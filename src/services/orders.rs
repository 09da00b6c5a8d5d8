use crate::{
    entities::{
        order, order_address, order_item, payment, product_variant, Order, OrderAddress,
        OrderItem, OrderItemStatus, Payment, PaymentStatus, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons, payments, wallet},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order-level status, derived from line statuses and the payment. Never
/// stored: per-line fulfillment is the source of truth and the aggregate is
/// recomputed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Failed,
}

/// Aggregation law: a failed payment dominates everything; otherwise the
/// least-advanced active line wins, so the order reads "processing" until
/// every line has moved on.
pub fn derive_status(items: &[order_item::Model], payment: &payment::Model) -> OrderStatus {
    if payment.status == PaymentStatus::Failed {
        return OrderStatus::Failed;
    }

    let any = |s: OrderItemStatus| items.iter().any(|i| i.status == s);

    if any(OrderItemStatus::Pending) {
        return OrderStatus::Pending;
    }
    if any(OrderItemStatus::Processing) {
        return OrderStatus::Processing;
    }
    if any(OrderItemStatus::Shipped) {
        return OrderStatus::Shipped;
    }
    if any(OrderItemStatus::OutForDelivery) {
        return OrderStatus::OutForDelivery;
    }

    let active: Vec<_> = items
        .iter()
        .filter(|i| i.status != OrderItemStatus::Cancelled)
        .collect();
    if active.is_empty() {
        return OrderStatus::Cancelled;
    }
    // Remaining lines are all delivered or refunded.
    OrderStatus::Delivered
}

/// Full order view returned to the client.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub status: OrderStatus,
    pub items: Vec<order_item::Model>,
    pub payment: payment::Model,
    pub address: Option<order_address::Model>,
}

/// Post-purchase order operations: reads, cancellation with restock and
/// wallet refund, and the admin fulfillment progression.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches one of the user's orders with its derived status.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;
        self.detail(&*self.db, order).await
    }

    /// The user's orders, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetail>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            details.push(self.detail(&*self.db, order).await?);
        }
        Ok((details, total))
    }

    /// Cancels the whole order. Allowed only while every non-cancelled line
    /// is still `processing`; once anything ships, cancellation is per-line.
    /// Restocks each line and refunds the paid item total to the wallet in a
    /// single aggregate credit.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        reason: String,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;
        let payment = self.payment_of(&*self.db, order_id).await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let to_cancel: Vec<_> = items
            .iter()
            .filter(|i| i.status != OrderItemStatus::Cancelled)
            .cloned()
            .collect();
        if to_cancel.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Order is already cancelled".to_string(),
            ));
        }
        if to_cancel
            .iter()
            .any(|i| i.status != OrderItemStatus::Processing)
        {
            return Err(ServiceError::InvalidOperation(
                "Order can no longer be cancelled as a whole; cancel items individually"
                    .to_string(),
            ));
        }

        let refund: Decimal = to_cancel.iter().map(|i| i.total).sum();

        let txn = self.db.begin().await?;

        for item in &to_cancel {
            cancel_line(&txn, item.clone(), &reason).await?;
        }

        let mut credited = None;
        if payment.status == PaymentStatus::Completed && refund > Decimal::ZERO {
            let entry = wallet::credit(
                &txn,
                user_id,
                refund,
                Some(order_id),
                None,
                &format!("Refund for cancelled order {}", order.order_number),
            )
            .await?;
            credited = Some((entry.wallet_id, refund));
        }

        // The failure path already gave the coupon slot back.
        if payment.status != PaymentStatus::Failed {
            if let Some(coupon_id) = order.coupon_id {
                coupons::release_usage(&txn, coupon_id).await?;
            }
        }

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCancelled(order_id)).await;
        if let Some((wallet_id, amount)) = credited {
            self.event_sender
                .send_or_log(Event::WalletCredited { wallet_id, amount })
                .await;
        }
        info!(order_number = %order.order_number, "order cancelled");

        self.detail(&*self.db, order).await
    }

    /// Cancels a single line. Refunds the line total if the order was paid;
    /// the coupon slot is released only when this was the last active line.
    #[instrument(skip(self))]
    pub async fn cancel_item(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
        reason: String,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;
        let payment = self.payment_of(&*self.db, order_id).await?;
        let item = self.item_of(&*self.db, order_id, item_id).await?;

        if item.status != OrderItemStatus::Processing {
            return Err(ServiceError::InvalidOperation(format!(
                "Item cannot be cancelled in its current state ({:?})",
                item.status
            )));
        }

        let refund = item.total;

        let txn = self.db.begin().await?;

        cancel_line(&txn, item, &reason).await?;

        let mut credited = None;
        if payment.status == PaymentStatus::Completed && refund > Decimal::ZERO {
            let entry = wallet::credit(
                &txn,
                user_id,
                refund,
                Some(order_id),
                Some(item_id),
                &format!("Refund for cancelled item on order {}", order.order_number),
            )
            .await?;
            credited = Some((entry.wallet_id, refund));
        }

        let remaining = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .filter(order_item::Column::Status.ne(OrderItemStatus::Cancelled))
            .count(&txn)
            .await?;
        if remaining == 0 && payment.status != PaymentStatus::Failed {
            if let Some(coupon_id) = order.coupon_id {
                coupons::release_usage(&txn, coupon_id).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderItemCancelled { order_id, item_id })
            .await;
        if let Some((wallet_id, amount)) = credited {
            self.event_sender
                .send_or_log(Event::WalletCredited { wallet_id, amount })
                .await;
        }
        info!(order_number = %order.order_number, item_id = %item_id, "order item cancelled");

        self.detail(&*self.db, order).await
    }

    /// Admin fulfillment progression. Only single forward steps are allowed
    /// (`processing -> shipped -> out_for_delivery -> delivered`), each
    /// stamping its timestamp. Delivering the last active line of a
    /// cash-on-delivery order completes its payment.
    #[instrument(skip(self))]
    pub async fn update_item_status(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        new_status: OrderItemStatus,
    ) -> Result<order_item::Model, ServiceError> {
        let item = self.item_of(&*self.db, order_id, item_id).await?;

        let allowed = matches!(
            (item.status, new_status),
            (OrderItemStatus::Processing, OrderItemStatus::Shipped)
                | (OrderItemStatus::Shipped, OrderItemStatus::OutForDelivery)
                | (OrderItemStatus::OutForDelivery, OrderItemStatus::Delivered)
        );
        if !allowed {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move item from {:?} to {:?}",
                item.status, new_status
            )));
        }

        let txn = self.db.begin().await?;

        let now = Utc::now();
        let mut active: order_item::ActiveModel = item.into();
        active.status = Set(new_status);
        match new_status {
            OrderItemStatus::Shipped => active.shipped_at = Set(Some(now)),
            OrderItemStatus::OutForDelivery => active.out_for_delivery_at = Set(Some(now)),
            OrderItemStatus::Delivered => active.delivered_at = Set(Some(now)),
            _ => {}
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        if new_status == OrderItemStatus::Delivered {
            let undelivered = OrderItem::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .filter(order_item::Column::Status.ne(OrderItemStatus::Delivered))
                .filter(order_item::Column::Status.ne(OrderItemStatus::Cancelled))
                .filter(order_item::Column::Status.ne(OrderItemStatus::Refunded))
                .count(&txn)
                .await?;
            if undelivered == 0 {
                payments::complete_cod_payment(&txn, order_id).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderItemStatusChanged {
                order_id,
                item_id,
                new_status: format!("{:?}", new_status),
            })
            .await;

        Ok(updated)
    }

    async fn detail<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
    ) -> Result<OrderDetail, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?;
        let payment = self.payment_of(conn, order.id).await?;
        let address = OrderAddress::find()
            .filter(order_address::Column::OrderId.eq(order.id))
            .one(conn)
            .await?;

        let status = derive_status(&items, &payment);
        Ok(OrderDetail {
            order,
            status,
            items,
            payment,
            address,
        })
    }

    async fn owned_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.user_id != user_id {
            // Do not reveal that the order exists.
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        Ok(order)
    }

    async fn payment_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<payment::Model, ServiceError> {
        Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment for order {} not found", order_id))
            })
    }

    async fn item_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        item_id: Uuid,
    ) -> Result<order_item::Model, ServiceError> {
        let item = OrderItem::find_by_id(item_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", item_id)))?;

        if item.order_id != order_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this order".to_string(),
            ));
        }
        Ok(item)
    }
}

/// Cancels one line and puts its stock back, inside the caller's transaction.
async fn cancel_line<C: ConnectionTrait>(
    conn: &C,
    item: order_item::Model,
    reason: &str,
) -> Result<(), ServiceError> {
    restock(conn, item.variant_id, item.quantity).await?;

    let mut active: order_item::ActiveModel = item.into();
    active.status = Set(OrderItemStatus::Cancelled);
    active.cancel_reason = Set(Some(reason.to_string()));
    active.cancelled_at = Set(Some(Utc::now()));
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

/// Returns quantity to a variant's stock.
pub(crate) async fn restock<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let variant = ProductVariant::find_by_id(variant_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

    let new_stock = variant.stock_count + quantity;
    let mut variant: product_variant::ActiveModel = variant.into();
    variant.stock_count = Set(new_stock);
    variant.updated_at = Set(Utc::now());
    variant.update(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;

    fn item(status: OrderItemStatus) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            category_name: "Widgets".to_string(),
            quantity: 1,
            unit_price: Decimal::ONE_HUNDRED,
            unit_selling_price: Decimal::ONE_HUNDRED,
            discount: Decimal::ZERO,
            coupon_discount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ONE_HUNDRED,
            status,
            cancel_reason: None,
            shipped_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
            refunded_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pay(status: PaymentStatus) -> payment::Model {
        payment::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            method: PaymentMethod::Gateway,
            status,
            amount: Decimal::ONE_HUNDRED,
            transaction_id: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn failed_payment_dominates() {
        let items = vec![item(OrderItemStatus::Delivered)];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Failed)),
            OrderStatus::Failed
        );
    }

    #[test]
    fn least_advanced_active_line_wins() {
        let items = vec![
            item(OrderItemStatus::Shipped),
            item(OrderItemStatus::Processing),
            item(OrderItemStatus::Delivered),
        ];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Completed)),
            OrderStatus::Processing
        );
    }

    #[test]
    fn mixed_delivered_and_cancelled_is_delivered() {
        let items = vec![
            item(OrderItemStatus::Delivered),
            item(OrderItemStatus::Cancelled),
        ];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Completed)),
            OrderStatus::Delivered
        );
    }

    #[test]
    fn all_cancelled_is_cancelled() {
        let items = vec![
            item(OrderItemStatus::Cancelled),
            item(OrderItemStatus::Cancelled),
        ];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Completed)),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn pending_lines_keep_the_order_pending() {
        let items = vec![item(OrderItemStatus::Pending)];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Pending)),
            OrderStatus::Pending
        );
    }

    #[test]
    fn refunded_lines_count_as_settled() {
        let items = vec![
            item(OrderItemStatus::Delivered),
            item(OrderItemStatus::Refunded),
        ];
        assert_eq!(
            derive_status(&items, &pay(PaymentStatus::Completed)),
            OrderStatus::Delivered
        );
    }
}
