use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct RepriceResponse {
    pub repriced: u64,
}

/// Recompute the cached selling price after an offer change. Wired to the
/// offer mutation paths in the back office.
pub async fn reprice_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state.services.pricing.reprice_variant(variant_id).await?;
    Ok(Json(variant))
}

pub async fn reprice_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let repriced = state.services.pricing.reprice_product(product_id).await?;
    Ok(Json(RepriceResponse { repriced }))
}

pub async fn reprice_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let repriced = state.services.pricing.reprice_category(category_id).await?;
    Ok(Json(RepriceResponse { repriced }))
}
