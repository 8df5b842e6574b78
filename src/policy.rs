//! Role based access policy.
//!
//! Roles form a closed enumeration and each operation maps to a
//! [Capability]; whether a role grants a capability is decided by one
//! explicit table rather than string comparisons scattered through the
//! handlers.

use serde::{Deserialize, Serialize};

use crate::Error;

/// The role carried by a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    User,
    ReadOnly,
}

/// The operations the policy distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// All GET endpoints: listings, single lookups and analytics.
    ReadData,
    /// Creating, updating and deleting transactions.
    MutateTransactions,
    /// Creating, updating and deleting categories.
    ManageCategories,
}

impl Role {
    /// The capability table: whether this role may perform `capability`.
    pub fn allows(self, capability: Capability) -> bool {
        match (self, capability) {
            (_, Capability::ReadData) => true,
            (Role::User | Role::Admin, Capability::MutateTransactions) => true,
            (Role::Admin, Capability::ManageCategories) => true,
            _ => false,
        }
    }
}

/// Check that `role` grants `capability`.
///
/// # Errors
/// Returns an [Error::Forbidden] if it does not. Handlers call this before
/// performing any side effect.
pub fn authorize(role: Role, capability: Capability) -> Result<(), Error> {
    if role.allows(capability) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}
