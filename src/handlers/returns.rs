use crate::{
    errors::ServiceError,
    handlers::common::{Paginated, PaginationParams, UserId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RequestReturnInput {
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub reason: String,
}

pub async fn request_return(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(input): Json<RequestReturnInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .returns
        .request_return(user_id, input.order_id, input.order_item_id, input.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_returns(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.clamped();
    let (data, total) = state
        .services
        .returns
        .list_returns(user_id, page, per_page)
        .await?;
    Ok(Json(Paginated::new(data, total, page, per_page)))
}

/// Back-office approval: refund to wallet, restock, mark refunded.
pub async fn approve_return(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.returns.approve_return(request_id).await?;
    Ok(Json(request))
}

pub async fn cancel_return(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .returns
        .cancel_return(user_id, request_id)
        .await?;
    Ok(Json(request))
}
