use crate::{
    config::AppConfig,
    entities::{cart, cart_item, product, product_variant, Cart, CartItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Cart aggregator.
///
/// Validates cart mutations against current product/variant state and prices
/// the cart on read. Lines whose product or variant has been deactivated are
/// excluded from totals but kept in the cart, modelling "the item became
/// unavailable after being added".
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Fetches the user's cart, creating it lazily on first use.
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        get_or_create_cart(&*self.db, user_id).await
    }

    /// Adds an item to the cart, or raises the quantity if the same
    /// (product, variant) pair is already present. The combined quantity is
    /// validated against the per-line cap and current stock; a violation
    /// rejects the mutation rather than clamping.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = get_or_create_cart(&txn, user_id).await?;

        let variant = product_variant::Entity::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
            })?;

        if variant.product_id != input.product_id {
            return Err(ServiceError::ValidationError(
                "Variant does not belong to this product".to_string(),
            ));
        }

        let product = product::Entity::find_by_id(variant.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", variant.product_id))
            })?;

        if !product.is_active || !variant.is_active {
            return Err(ServiceError::InvalidOperation(
                "Product is unavailable".to_string(),
            ));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        let new_quantity = existing.as_ref().map_or(0, |i| i.quantity) + input.quantity;
        self.check_quantity(new_quantity, &variant)?;

        if let Some(item) = existing {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(new_quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        let view = price_cart(&txn, &self.config, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                variant_id: input.variant_id,
            })
            .await;

        info!(
            "added to cart {}: variant {} x{}",
            cart.id, input.variant_id, input.quantity
        );
        Ok(view)
    }

    /// Sets the quantity of a cart line. Quantities outside `[1, max]` or
    /// above stock are rejected; removal is a separate operation.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.cart_of(&txn, user_id).await?;
        let item = self.item_in_cart(&txn, &cart, item_id).await?;

        let variant = product_variant::Entity::find_by_id(item.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", item.variant_id))
            })?;

        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        self.check_quantity(quantity, &variant)?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        let view = price_cart(&txn, &self.config, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(view)
    }

    /// Removes a single line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.cart_of(&txn, user_id).await?;
        let item = self.item_in_cart(&txn, &cart, item_id).await?;
        item.delete(&txn).await?;

        let view = price_cart(&txn, &self.config, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(view)
    }

    /// Prices the user's cart: per-line validity filtering plus cart totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = get_or_create_cart(&*self.db, user_id).await?;
        price_cart(&*self.db, &self.config, &cart).await
    }

    fn check_quantity(
        &self,
        quantity: i32,
        variant: &product_variant::Model,
    ) -> Result<(), ServiceError> {
        if quantity > self.config.max_quantity_per_line {
            return Err(ServiceError::ValidationError(format!(
                "Quantity cannot exceed {} per item",
                self.config.max_quantity_per_line
            )));
        }
        if quantity > variant.stock_count {
            return Err(ServiceError::InsufficientStock(format!(
                "insufficient stock for variant {}",
                variant.sku
            )));
        }
        Ok(())
    }

    async fn cart_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {} not found", user_id)))
    }

    async fn item_in_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }
        Ok(item)
    }
}

/// Fetches or lazily creates the single cart owned by a user.
pub(crate) async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    if let Some(cart) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(cart);
    }

    let cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    Ok(cart.insert(conn).await?)
}

/// Loads the cart's lines joined with their live product/variant state and
/// computes totals over the valid lines.
pub(crate) async fn price_cart<C: ConnectionTrait>(
    conn: &C,
    config: &AppConfig,
    cart: &cart::Model,
) -> Result<CartView, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let variant = product_variant::Entity::find_by_id(item.variant_id)
            .one(conn)
            .await?;
        let product = match &variant {
            Some(v) => product::Entity::find_by_id(v.product_id).one(conn).await?,
            None => None,
        };

        let (available, variant, product) = match (variant, product) {
            (Some(v), Some(p)) => {
                let ok = v.is_active && p.is_active;
                (ok, v, p)
            }
            _ => {
                // Catalog row vanished; treat the line as unavailable.
                continue;
            }
        };

        let quantity = Decimal::from(item.quantity);
        lines.push(PricedCartLine {
            line_subtotal: quantity * variant.actual_price,
            line_discount: quantity * (variant.actual_price - variant.selling_price),
            product_name: product.name,
            category_id: product.category_id,
            unit_price: variant.actual_price,
            unit_selling_price: variant.selling_price,
            stock_count: variant.stock_count,
            available,
            item,
        });
    }

    let totals = compute_totals(
        &lines,
        config.tax_rate(),
        config.shipping_fee(),
        config.free_shipping_threshold(),
    );

    Ok(CartView {
        cart: cart.clone(),
        lines,
        totals,
    })
}

/// Cart-level totals law:
/// `tax = (subtotal - discount) * rate`, flat delivery fee below the
/// free-shipping threshold, `total = subtotal - discount + tax + delivery`
/// floored at zero. Only valid lines participate.
pub fn compute_totals(
    lines: &[PricedCartLine],
    tax_rate: Decimal,
    shipping_fee: Decimal,
    free_shipping_threshold: Decimal,
) -> CartTotals {
    let valid: Vec<&PricedCartLine> = lines.iter().filter(|l| l.available).collect();

    let subtotal: Decimal = valid.iter().map(|l| l.line_subtotal).sum();
    let discount: Decimal = valid.iter().map(|l| l.line_discount).sum();

    let taxable = subtotal - discount;
    let tax = taxable * tax_rate;

    let delivery = if valid.is_empty() || taxable >= free_shipping_threshold {
        Decimal::ZERO
    } else {
        shipping_fee
    };

    let total = (subtotal - discount + tax + delivery).max(Decimal::ZERO);

    CartTotals {
        subtotal,
        discount,
        tax,
        delivery,
        total,
    }
}

/// Input for adding an item to the cart
#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// A cart line joined with live catalog state
#[derive(Debug, Clone, Serialize)]
pub struct PricedCartLine {
    pub item: cart_item::Model,
    pub product_name: String,
    #[serde(skip)]
    pub category_id: Uuid,
    pub unit_price: Decimal,
    pub unit_selling_price: Decimal,
    pub line_subtotal: Decimal,
    pub line_discount: Decimal,
    #[serde(skip)]
    pub stock_count: i32,
    pub available: bool,
}

/// Cart-level totals
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub delivery: Decimal,
    pub total: Decimal,
}

/// Cart with priced lines
#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: cart::Model,
    pub lines: Vec<PricedCartLine>,
    pub totals: CartTotals,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal, unit_selling: Decimal, available: bool) -> PricedCartLine {
        let q = Decimal::from(quantity);
        PricedCartLine {
            item: cart_item::Model {
                id: Uuid::new_v4(),
                cart_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                variant_id: Uuid::new_v4(),
                quantity,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            product_name: "Test".to_string(),
            category_id: Uuid::new_v4(),
            unit_price,
            unit_selling_price: unit_selling,
            line_subtotal: q * unit_price,
            line_discount: q * (unit_price - unit_selling),
            stock_count: 100,
            available,
        }
    }

    #[test]
    fn subtotal_900_gets_tax_27_and_delivery_99() {
        // subtotal 900, no discount -> tax 27.00, delivery 99, total 1026.00
        let lines = vec![line(3, dec!(300), dec!(300), true)];
        let totals = compute_totals(&lines, dec!(0.03), dec!(99), dec!(1000));

        assert_eq!(totals.subtotal, dec!(900));
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.tax, dec!(27.00));
        assert_eq!(totals.delivery, dec!(99));
        assert_eq!(totals.total, dec!(1026.00));
    }

    #[test]
    fn free_shipping_at_threshold() {
        let lines = vec![line(1, dec!(1000), dec!(1000), true)];
        let totals = compute_totals(&lines, dec!(0.03), dec!(99), dec!(1000));
        assert_eq!(totals.delivery, Decimal::ZERO);
    }

    #[test]
    fn discount_basis_can_drop_below_threshold() {
        // 1100 catalog, 10% offer -> taxable 990, below the 1000 threshold
        let lines = vec![line(1, dec!(1100), dec!(990), true)];
        let totals = compute_totals(&lines, dec!(0.03), dec!(99), dec!(1000));
        assert_eq!(totals.discount, dec!(110));
        assert_eq!(totals.delivery, dec!(99));
    }

    #[test]
    fn unavailable_lines_are_excluded_from_totals() {
        let lines = vec![
            line(2, dec!(100), dec!(100), true),
            line(5, dec!(400), dec!(400), false),
        ];
        let totals = compute_totals(&lines, dec!(0.03), dec!(99), dec!(1000));
        assert_eq!(totals.subtotal, dec!(200));
    }

    #[test]
    fn empty_cart_has_zero_totals_and_no_delivery_fee() {
        let totals = compute_totals(&[], dec!(0.03), dec!(99), dec!(1000));
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.delivery, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn total_is_floored_at_zero() {
        // Pathological discount larger than subtotal
        let mut l = line(1, dec!(100), dec!(100), true);
        l.line_discount = dec!(500);
        let totals = compute_totals(&[l], Decimal::ZERO, Decimal::ZERO, dec!(1000));
        assert_eq!(totals.total, Decimal::ZERO);
    }
}
