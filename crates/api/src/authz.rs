//! Route-level permission guard.
//!
//! Handlers call [`require`] before touching a store, keeping the domain
//! crates and infra auth-agnostic.

use shopfront_auth::{authorize, AuthzError, Permission};

use crate::context::PrincipalContext;

/// Check one permission for the current admin.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), AuthzError> {
    authorize(principal.principal(), &Permission::new(permission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfront_auth::Role;
    use shopfront_core::UserId;

    #[test]
    fn catalog_manager_cannot_touch_orders() {
        let p = PrincipalContext::new(UserId::new(), vec![Role::new("catalog_manager")]);
        assert!(require(&p, "catalog.publish").is_ok());
        assert_eq!(
            require(&p, "orders.write"),
            Err(AuthzError::Forbidden("orders.write".into()))
        );
    }
}
