use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, `"<area>.<action>"` (e.g. `"catalog.publish"`).
///
/// `"*"` is the wildcard granted to admins; `"<area>.*"` grants every action
/// of one area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Area prefix (`"catalog"` for `"catalog.publish"`).
    pub fn area(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }

    /// Whether holding `self` satisfies `required`.
    pub fn covers(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(area) => area == required.area(),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_wildcard_covers_same_area_only() {
        let p = Permission::new("orders.*");
        assert!(p.covers(&Permission::new("orders.write")));
        assert!(!p.covers(&Permission::new("supplier_orders.write")));
    }

    #[test]
    fn exact_and_global() {
        assert!(Permission::new("*").covers(&Permission::new("anything.at_all")));
        assert!(Permission::new("catalog.read").covers(&Permission::new("catalog.read")));
        assert!(!Permission::new("catalog.read").covers(&Permission::new("catalog.write")));
    }
}
