use crate::{
    errors::ServiceError, handlers::common::UserId, services::payments::GatewayCallback, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

pub async fn get_payment(
    State(state): State<AppState>,
    _user: UserId,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.services.payments.get_payment(order_id).await?;
    Ok(Json(payment))
}

/// Gateway callback landing point. Unauthenticated by design; the HMAC
/// signature inside the body is the proof of origin.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(callback): Json<GatewayCallback>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .payments
        .confirm_gateway(order_id, callback)
        .await?;
    Ok(Json(outcome))
}

pub async fn retry_payment(
    State(state): State<AppState>,
    _user: UserId,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let gateway_order = state.services.payments.retry_payment(order_id).await?;
    Ok(Json(gateway_order))
}
