//! Domain models for the shop.
//!
//! These are validated domain objects, separate from database row types and
//! from the JSON shapes returned by the routes.

pub mod fish;
pub mod order;
pub mod user;

pub use fish::{Fish, NewFish};
pub use order::{NewOrder, Order, OrderLine, OrderRuleError};
pub use user::{CurrentUser, NewUser, User};
