use crate::{
    entities::{offer, product, product_variant, OfferScope, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of evaluating offers against a variant's catalog price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePrice {
    pub selling_price: Decimal,
    pub discount_percent: Decimal,
}

/// Pricing engine.
///
/// Computes a variant's effective selling price from the currently active
/// product- and category-level offers. The result is written back onto the
/// variant (`selling_price` is a denormalized cache) whenever an offer is
/// created, updated, or toggled — callers invoke the `reprice_*` operations
/// from those mutation paths.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Computes the effective price for a variant.
    ///
    /// Never blocks the caller on catalog problems: if the owning product
    /// cannot be loaded the variant sells at its catalog price with no
    /// discount.
    pub async fn effective_price(&self, variant: &product_variant::Model) -> EffectivePrice {
        match self
            .current_discount_percent(&*self.db, variant.product_id)
            .await
        {
            Ok(percent) => compute_effective_price(variant.actual_price, percent),
            Err(e) => {
                warn!(
                    variant_id = %variant.id,
                    error = %e,
                    "offer lookup failed, falling back to catalog price"
                );
                compute_effective_price(variant.actual_price, Decimal::ZERO)
            }
        }
    }

    /// Recomputes and persists the selling price of a single variant.
    #[instrument(skip(self))]
    pub async fn reprice_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        let variant = ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        let priced = self.effective_price(&variant).await;

        let mut active: product_variant::ActiveModel = variant.into();
        active.selling_price = Set(priced.selling_price);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::VariantRepriced {
                variant_id,
                selling_price: updated.selling_price,
            })
            .await;

        Ok(updated)
    }

    /// Reprices every variant of a product. Invoked when a product-scoped
    /// offer changes.
    #[instrument(skip(self))]
    pub async fn reprice_product(&self, product_id: Uuid) -> Result<u64, ServiceError> {
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;

        let count = variants.len() as u64;
        for variant in variants {
            self.reprice_variant(variant.id).await?;
        }

        info!("repriced {} variants of product {}", count, product_id);
        Ok(count)
    }

    /// Reprices every variant in a category. Invoked when a category-scoped
    /// offer changes.
    #[instrument(skip(self))]
    pub async fn reprice_category(&self, category_id: Uuid) -> Result<u64, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .all(&*self.db)
            .await?;

        let mut count = 0;
        for p in products {
            count += self.reprice_product(p.id).await?;
        }
        Ok(count)
    }

    /// Highest current discount percentage across the product's own offers
    /// and its category's offers. Zero when none is current.
    async fn current_discount_percent<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let now = Utc::now();

        let product_offers = offer::Entity::find()
            .filter(offer::Column::Scope.eq(OfferScope::Product))
            .filter(offer::Column::ProductId.eq(product_id))
            .all(conn)
            .await?;

        let category_offers = offer::Entity::find()
            .filter(offer::Column::Scope.eq(OfferScope::Category))
            .filter(offer::Column::CategoryId.eq(product.category_id))
            .all(conn)
            .await?;

        let best = product_offers
            .iter()
            .chain(category_offers.iter())
            .filter(|o| o.is_current(now))
            .map(|o| o.percentage)
            .max()
            .unwrap_or(Decimal::ZERO);

        Ok(best)
    }
}

/// Pure pricing law: `selling = actual * (1 - pct/100)`, guarded so a
/// corrupt >100% discount falls back to the catalog price with no discount.
pub fn compute_effective_price(actual_price: Decimal, discount_percent: Decimal) -> EffectivePrice {
    let selling_price =
        actual_price * (Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED);

    if selling_price < Decimal::ZERO {
        EffectivePrice {
            selling_price: actual_price,
            discount_percent: Decimal::ZERO,
        }
    } else {
        EffectivePrice {
            selling_price,
            discount_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_offer_sells_at_catalog_price() {
        let priced = compute_effective_price(dec!(500), Decimal::ZERO);
        assert_eq!(priced.selling_price, dec!(500));
        assert_eq!(priced.discount_percent, Decimal::ZERO);
    }

    #[test]
    fn ten_percent_category_offer() {
        // actualPrice=500, category offer 10% -> sellingPrice=450
        let priced = compute_effective_price(dec!(500), dec!(10));
        assert_eq!(priced.selling_price, dec!(450.0));
        assert_eq!(priced.discount_percent, dec!(10));
    }

    #[test]
    fn selling_price_never_exceeds_actual() {
        for pct in [dec!(0), dec!(1), dec!(33), dec!(99.5), dec!(100)] {
            let priced = compute_effective_price(dec!(750), pct);
            assert!(priced.selling_price <= dec!(750));
        }
    }

    #[test]
    fn corrupt_discount_falls_back_to_catalog_price() {
        let priced = compute_effective_price(dec!(100), dec!(150));
        assert_eq!(priced.selling_price, dec!(100));
        assert_eq!(priced.discount_percent, Decimal::ZERO);
    }

    #[test]
    fn full_discount_is_free_not_negative() {
        let priced = compute_effective_price(dec!(100), dec!(100));
        assert_eq!(priced.selling_price, Decimal::ZERO);
        assert_eq!(priced.discount_percent, dec!(100));
    }
}
