use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; [`role_permissions`] is the
/// static policy that maps them to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles the back-office knows how to map.
pub const KNOWN_ROLES: &[&str] = &["admin", "catalog_manager", "fulfillment", "viewer"];

const CATALOG_MANAGER: &[&str] = &[
    "catalog.read",
    "catalog.write",
    "catalog.publish",
    "promotions.read",
    "promotions.write",
];

const FULFILLMENT: &[&str] = &[
    "orders.read",
    "orders.write",
    "supplier_orders.read",
    "supplier_orders.write",
    "shipments.read",
    "shipments.write",
    "lockers.refresh",
];

const VIEWER: &[&str] = &[
    "catalog.read",
    "promotions.read",
    "orders.read",
    "supplier_orders.read",
    "shipments.read",
];

/// Static role -> permission policy. Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> Vec<Permission> {
    let perms: &[&'static str] = match role {
        "admin" => &["*"],
        "catalog_manager" => CATALOG_MANAGER,
        "fulfillment" => FULFILLMENT,
        "viewer" => VIEWER,
        _ => &[],
    };
    perms.iter().map(|p| Permission::new(*p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_wildcard() {
        assert!(role_permissions("admin").iter().all(|p| p.is_wildcard()));
    }

    #[test]
    fn viewer_only_reads() {
        assert!(role_permissions("viewer")
            .iter()
            .all(|p| p.as_str().ends_with(".read")));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(role_permissions("intern").is_empty());
    }
}
