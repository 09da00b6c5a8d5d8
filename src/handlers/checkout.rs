use crate::{
    errors::ServiceError, handlers::common::UserId, services::checkout::PlaceOrderInput, AppState,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn place_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(input): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.checkout.place_order(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
