use crate::{
    errors::ServiceError,
    handlers::common::UserId,
    services::cart::AddToCartInput,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

pub async fn get_cart(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.cart.get_cart(user_id).await?;
    Ok(Json(view))
}

pub async fn add_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(input): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.cart.add_item(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityInput {
    pub quantity: i32,
}

pub async fn update_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateQuantityInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .cart
        .update_item_quantity(user_id, item_id, input.quantity)
        .await?;
    Ok(Json(view))
}

pub async fn remove_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.cart.remove_item(user_id, item_id).await?;
    Ok(Json(view))
}
