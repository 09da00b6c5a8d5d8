use crate::{
    entities::{coupon, Coupon},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

/// Stable user-facing message for a coupon that fails validity checks.
pub const COUPON_NOT_APPLICABLE: &str = "Coupon not applicable";

/// Stable user-facing message for an exhausted coupon.
pub const COUPON_EXHAUSTED: &str = "Coupon usage limit reached";

/// Looks up a coupon by code and validates it against the cart subtotal.
pub(crate) async fn find_valid_coupon<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<coupon::Model, ServiceError> {
    let coupon = Coupon::find()
        .filter(coupon::Column::Code.eq(code))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

    validate_coupon(&coupon, subtotal, now)?;
    Ok(coupon)
}

/// Coupon validity: active, unexpired, not exhausted, subtotal at or above
/// the coupon's minimum.
pub fn validate_coupon(
    coupon: &coupon::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active || coupon.expiration_date <= now || subtotal < coupon.min_amount {
        return Err(ServiceError::ValidationError(
            COUPON_NOT_APPLICABLE.to_string(),
        ));
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(ServiceError::Conflict(COUPON_EXHAUSTED.to_string()));
    }
    Ok(())
}

/// Coupon discount law: `min(percent of subtotal, max_amount if set,
/// subtotal - offer_discount)` — the coupon never discounts below what the
/// offers already took the order to, and never goes negative.
pub fn coupon_discount_amount(
    coupon: &coupon::Model,
    subtotal: Decimal,
    offer_discount: Decimal,
) -> Decimal {
    let mut discount = subtotal * coupon.percentage / Decimal::ONE_HUNDRED;
    if let Some(max) = coupon.max_amount {
        discount = discount.min(max);
    }
    discount.min(subtotal - offer_discount).max(Decimal::ZERO)
}

/// Reserves one usage inside the caller's transaction, re-checking the limit
/// under the transaction so two concurrent checkouts cannot both take the
/// last slot.
pub(crate) async fn reserve_usage<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Uuid,
) -> Result<(), ServiceError> {
    let coupon = Coupon::find_by_id(coupon_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

    if coupon.used_count >= coupon.usage_limit {
        return Err(ServiceError::Conflict(COUPON_EXHAUSTED.to_string()));
    }

    let used = coupon.used_count;
    let mut active: coupon::ActiveModel = coupon.into();
    active.used_count = Set(used + 1);
    active.update(conn).await?;
    Ok(())
}

/// Releases one usage, floored at zero. Used when a payment fails or an
/// order is cancelled.
pub(crate) async fn release_usage<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Uuid,
) -> Result<(), ServiceError> {
    let coupon = Coupon::find_by_id(coupon_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

    let used = coupon.used_count;
    if used == 0 {
        debug!(coupon_id = %coupon_id, "release requested on unused coupon");
        return Ok(());
    }

    let mut active: coupon::ActiveModel = coupon.into();
    active.used_count = Set(used - 1);
    active.update(conn).await?;
    Ok(())
}
