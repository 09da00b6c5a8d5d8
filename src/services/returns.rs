use crate::{
    config::AppConfig,
    entities::{
        order_item, return_request, OrderItem, OrderItemStatus, ReturnRequest, ReturnStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{orders::restock, wallet},
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Return workflow for delivered items.
///
/// A return may be requested within the configured window after delivery.
/// Approval refunds the item total to the buyer's wallet and puts the stock
/// back; until then the request can be withdrawn without side effects.
#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Opens a return request for a delivered item.
    #[instrument(skip(self, reason))]
    pub async fn request_return(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        order_item_id: Uuid,
        reason: String,
    ) -> Result<return_request::Model, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "A return reason is required".to_string(),
            ));
        }

        let item = OrderItem::find_by_id(order_item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order item {} not found", order_item_id))
            })?;

        if item.order_id != order_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this order".to_string(),
            ));
        }
        if item.status != OrderItemStatus::Delivered {
            return Err(ServiceError::InvalidOperation(
                "Only delivered items can be returned".to_string(),
            ));
        }

        let delivered_at = item.delivered_at.ok_or_else(|| {
            ServiceError::InternalError("Delivered item has no delivery date".to_string())
        })?;
        let window = Duration::days(self.config.return_window_days);
        if Utc::now() > delivered_at + window {
            return Err(ServiceError::InvalidOperation(format!(
                "Return window of {} days has passed",
                self.config.return_window_days
            )));
        }

        let open = ReturnRequest::find()
            .filter(return_request::Column::OrderItemId.eq(order_item_id))
            .filter(return_request::Column::Status.ne(ReturnStatus::Cancelled))
            .count(&*self.db)
            .await?;
        if open > 0 {
            return Err(ServiceError::Conflict(
                "A return request already exists for this item".to_string(),
            ));
        }

        let request = return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_id: Set(order_id),
            order_item_id: Set(order_item_id),
            reason: Set(reason),
            status: Set(ReturnStatus::Pending),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let request = request.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReturnRequested(request.id))
            .await;
        info!(request_id = %request.id, item_id = %order_item_id, "return requested");
        Ok(request)
    }

    /// Approves a pending return: refunds the item total to the wallet,
    /// restocks the variant, and marks the item refunded. One transaction.
    #[instrument(skip(self))]
    pub async fn approve_return(
        &self,
        request_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let request = self.pending_request(request_id).await?;

        let item = OrderItem::find_by_id(request.order_item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order item {} not found", request.order_item_id))
            })?;

        let txn = self.db.begin().await?;

        let refund = item.total;
        let entry = wallet::credit(
            &txn,
            request.user_id,
            refund,
            Some(request.order_id),
            Some(item.id),
            &format!("Refund for returned item {}", item.product_name),
        )
        .await?;

        restock(&txn, item.variant_id, item.quantity).await?;

        let mut item: order_item::ActiveModel = item.into();
        item.status = Set(OrderItemStatus::Refunded);
        item.refunded_at = Set(Some(Utc::now()));
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(ReturnStatus::Approved);
        active.updated_at = Set(Utc::now());
        let request = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnApproved(request.id))
            .await;
        self.event_sender
            .send_or_log(Event::WalletCredited {
                wallet_id: entry.wallet_id,
                amount: refund,
            })
            .await;
        info!(request_id = %request.id, refund = %refund, "return approved");
        Ok(request)
    }

    /// Withdraws a pending return request. No money or stock moves.
    #[instrument(skip(self))]
    pub async fn cancel_return(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let request = self.pending_request(request_id).await?;
        if request.user_id != user_id {
            return Err(ServiceError::NotFound(format!(
                "Return request {} not found",
                request_id
            )));
        }

        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(ReturnStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let request = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReturnCancelled(request.id))
            .await;
        Ok(request)
    }

    /// The user's return requests, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<return_request::Model>, u64), ServiceError> {
        let paginator = ReturnRequest::find()
            .filter(return_request::Column::UserId.eq(user_id))
            .order_by_desc(return_request::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    async fn pending_request(
        &self,
        request_id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let request = ReturnRequest::find_by_id(request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Return request {} not found", request_id))
            })?;

        if request.status != ReturnStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Return request is already {:?}",
                request.status
            )));
        }
        Ok(request)
    }
}
