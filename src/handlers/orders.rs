use crate::{
    entities::OrderItemStatus,
    errors::ServiceError,
    handlers::common::{Paginated, PaginationParams, UserId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

pub async fn list_orders(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.clamped();
    let (orders, total) = state
        .services
        .orders
        .list_orders(user_id, page, per_page)
        .await?;
    Ok(Json(Paginated::new(orders, total, page, per_page)))
}

pub async fn get_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.orders.get_order(user_id, order_id).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct CancelInput {
    pub reason: String,
}

pub async fn cancel_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CancelInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .orders
        .cancel_order(user_id, order_id, input.reason)
        .await?;
    Ok(Json(detail))
}

pub async fn cancel_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<CancelInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .orders
        .cancel_item(user_id, order_id, item_id, input.reason)
        .await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub status: OrderItemStatus,
}

/// Fulfillment progression, driven by back-office tooling.
pub async fn update_item_status(
    State(state): State<AppState>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateStatusInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .orders
        .update_item_status(order_id, item_id, input.status)
        .await?;
    Ok(Json(item))
}
