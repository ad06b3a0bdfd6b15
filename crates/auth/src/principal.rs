use serde::{Deserialize, Serialize};

use flowrack_core::UserId;

use crate::permissions::{Permission, permissions_for};
use crate::Role;

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve the permissions granted to `role`.
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            permissions: permissions_for(role),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this principal may act on a record owned by `owner`.
    pub fn owns_or_staff(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_staff()
    }
}
