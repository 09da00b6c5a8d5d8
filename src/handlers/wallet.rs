use crate::{
    errors::ServiceError,
    handlers::common::{Paginated, PaginationParams, UserId},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

pub async fn get_balance(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, ServiceError> {
    let balance = state.services.wallet.balance(user_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.clamped();
    let (data, total) = state
        .services
        .wallet
        .transactions(user_id, page, per_page)
        .await?;
    Ok(Json(Paginated::new(data, total, page, per_page)))
}
