//! Aggregates module
pub mod address;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod offer;
pub mod order;
pub mod product;
pub mod user;

pub use address::{Address, AddressError, AddressPatch, AddressType, NewAddress};
pub use cart::{AppliedCoupon, Cart, CartError, CartLine};
pub use category::{Category, CategoryError, CategorySummary};
pub use coupon::{Coupon, CouponError, CouponPatch, NewCoupon};
pub use offer::{Offer, OfferError, OfferPatch};
pub use order::{Order, OrderError, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
pub use product::{DefectiveProduct, NewProduct, Product, ProductError, ProductPatch, StockAction, StockFilter};
pub use user::{ProfilePatch, Role, User, UserError, UserStatus};
