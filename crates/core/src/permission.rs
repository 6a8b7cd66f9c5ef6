//! Role-based authorization.
//!
//! Handlers and services never compare roles directly; they ask whether a
//! role grants a [`Capability`]. The check is a pure function so it can be
//! used the same way whether the role came from a bearer token, a CLI flag or
//! a test fixture.

use serde::Serialize;

use crate::Role;

/// Something a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create, mutate and pay for one's own orders.
    PlaceOrder,
    /// Read and mutate orders owned by other users.
    ManageAnyOrder,
    /// Create staff accounts.
    CreateStaff,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlaceOrder => write!(f, "place_order"),
            Self::ManageAnyOrder => write!(f, "manage_any_order"),
            Self::CreateStaff => write!(f, "create_staff"),
        }
    }
}

/// The role does not grant the requested capability.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("role '{role}' is not permitted to {capability}")]
pub struct PermissionDenied {
    /// Role that was checked.
    pub role: Role,
    /// Capability that was requested.
    pub capability: Capability,
}

/// Whether `role` grants `capability`.
#[must_use]
pub const fn grants(role: Role, capability: Capability) -> bool {
    match capability {
        Capability::PlaceOrder => true,
        Capability::ManageAnyOrder => matches!(role, Role::Staff | Role::Manager),
        Capability::CreateStaff => matches!(role, Role::Manager),
    }
}

/// Check that `role` grants `capability`.
///
/// # Errors
///
/// Returns `PermissionDenied` if the role lacks the capability.
pub const fn authorize(role: Role, capability: Capability) -> Result<(), PermissionDenied> {
    if grants(role, capability) {
        Ok(())
    } else {
        Err(PermissionDenied { role, capability })
    }
}
