//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Accounts, password login, bearer tokens, Google sign-in
//! - `orders` - Order retrieval, line mutation and payment

pub mod auth;
pub mod orders;

pub use auth::{AuthError, AuthService};
pub use orders::{OrderError, OrderLineInput, OrderService};
