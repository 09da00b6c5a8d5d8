/// Storefront entities module
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod coupon;
pub mod offer;
pub mod order;
pub mod order_address;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod return_request;
pub mod wallet;
pub mod wallet_transaction;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use offer::{Entity as Offer, Model as OfferModel, OfferScope, OfferStatus};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_address::{Entity as OrderAddress, Model as OrderAddressModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel, OrderItemStatus};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentMethod, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use return_request::{Entity as ReturnRequest, Model as ReturnRequestModel, ReturnStatus};
pub use wallet::{Entity as Wallet, Model as WalletModel};
pub use wallet_transaction::{
    Entity as WalletTransaction, Model as WalletTransactionModel, WalletTransactionStatus,
    WalletTransactionType,
};
