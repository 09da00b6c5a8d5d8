use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coupon entity.
///
/// `used_count` is incremented when an order reserves the coupon at creation
/// time and decremented (floored at zero) when the payment fails or the
/// order is cancelled. `0 <= used_count <= usage_limit` must hold at all
/// times.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub max_amount: Option<Decimal>,
    pub usage_limit: i32,
    pub used_count: i32,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
