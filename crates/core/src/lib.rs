//! Koi Farm Core - Shared domain types.
//!
//! This crate provides the types shared by every Koi Farm component:
//! - `api` - REST backend for users, orders and the fish catalog
//! - `cli` - Command-line tools for migrations, bootstrap and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, usernames, emails, prices and statuses
//! - [`permission`] - Role/capability authorization checks

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod permission;
pub mod types;

pub use permission::{Capability, PermissionDenied, authorize};
pub use types::*;
