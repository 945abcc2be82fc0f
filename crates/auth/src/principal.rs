use shopfront_core::UserId;

use crate::{role_permissions, Permission, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve effective permissions from roles via the static policy.
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = roles
            .iter()
            .flat_map(|r| role_permissions(r.as_str()))
            .collect();
        permissions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        permissions.dedup();
        Self {
            user_id,
            roles,
            permissions,
        }
    }
}
