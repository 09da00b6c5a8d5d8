/// Order lifecycle services
pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod returns;
pub mod wallet;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use pricing::PricingService;
pub use returns::ReturnService;
pub use wallet::WalletService;
