//! Dropship supplier orders, one per order line of a supplier-backed product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_catalog::SupplierInfo;
use shopfront_core::{
    DomainError, DomainResult, Money, OrderId, OrderLineId, ProductId, SupplierOrderId,
};

use crate::order::{Order, OrderLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierOrderStatus {
    Pending,
    Ordered,
    Received,
    Unavailable,
}

impl SupplierOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplierOrderStatus::Pending => "pending",
            SupplierOrderStatus::Ordered => "ordered",
            SupplierOrderStatus::Received => "received",
            SupplierOrderStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SupplierOrderStatus::Pending),
            "ordered" => Some(SupplierOrderStatus::Ordered),
            "received" => Some(SupplierOrderStatus::Received),
            "unavailable" => Some(SupplierOrderStatus::Unavailable),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: SupplierOrderStatus) -> bool {
        use SupplierOrderStatus::*;
        matches!(
            (self, to),
            (Pending, Ordered)
                | (Pending, Unavailable)
                | (Ordered, Received)
                | (Ordered, Unavailable)
                | (Unavailable, Pending)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOrder {
    pub id: SupplierOrderId,
    pub order_id: OrderId,
    pub order_number: String,
    pub order_line_id: OrderLineId,
    pub product_id: ProductId,
    pub supplier_name: String,
    pub supplier_sku: Option<String>,
    pub supplier_url: Option<String>,
    pub quantity: u32,
    pub unit_cost: Option<Money>,
    pub status: SupplierOrderStatus,
    /// The supplier's own order/invoice number.
    pub supplier_reference: Option<String>,
    pub notes: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupplierOrderTransition {
    pub status: SupplierOrderStatus,
    pub supplier_reference: Option<String>,
    pub notes: Option<String>,
}

impl SupplierOrder {
    pub fn for_line(
        order: &Order,
        line: &OrderLine,
        supplier: &SupplierInfo,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SupplierOrderId::new(),
            order_id: order.id,
            order_number: order.order_number.clone(),
            order_line_id: line.id,
            product_id: line.product_id,
            supplier_name: supplier.name.clone(),
            supplier_sku: supplier.sku.clone(),
            supplier_url: supplier.url.clone(),
            quantity: line.quantity,
            unit_cost: supplier
                .cost_cents
                .map(|c| Money::new(c, line.unit_price.currency)),
            status: SupplierOrderStatus::Pending,
            supplier_reference: None,
            notes: None,
            ordered_at: None,
            received_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, t: SupplierOrderTransition, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.status;
        if !from.can_transition_to(t.status) {
            return Err(DomainError::invariant(format!(
                "supplier order {} cannot move from {} to {}",
                self.id,
                from.as_str(),
                t.status.as_str()
            )));
        }

        let reference = t
            .supplier_reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        match t.status {
            SupplierOrderStatus::Ordered => {
                let Some(reference) = reference else {
                    return Err(DomainError::validation(
                        "supplier_reference",
                        "required when marking as ordered",
                    ));
                };
                self.supplier_reference = Some(reference);
                self.ordered_at = Some(now);
            }
            SupplierOrderStatus::Received => {
                self.received_at = Some(now);
            }
            SupplierOrderStatus::Pending => {
                // Retry with another attempt at the supplier.
                self.supplier_reference = None;
                self.ordered_at = None;
            }
            SupplierOrderStatus::Unavailable => {}
        }
        if let Some(notes) = t.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            self.notes = Some(notes);
        }
        self.status = t.status;
        self.updated_at = now;
        Ok(())
    }
}

/// True when there is at least one supplier order and all are received.
pub fn all_received(orders: &[SupplierOrder]) -> bool {
    !orders.is_empty()
        && orders
            .iter()
            .all(|o| o.status == SupplierOrderStatus::Received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::tests::{now, product};
    use crate::order::tests::placed;

    fn pending() -> SupplierOrder {
        let products = [product("Potjie Pot", 90_000, 4, true)];
        placed(&products).supplier_orders.remove(0)
    }

    fn to(status: SupplierOrderStatus, reference: Option<&str>) -> SupplierOrderTransition {
        SupplierOrderTransition {
            status,
            supplier_reference: reference.map(Into::into),
            notes: None,
        }
    }

    #[test]
    fn ordering_requires_reference() {
        let mut so = pending();
        let err = so.transition(to(SupplierOrderStatus::Ordered, Some("  ")), now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref e) if e.has_field("supplier_reference")));
        assert_eq!(so.status, SupplierOrderStatus::Pending);

        so.transition(to(SupplierOrderStatus::Ordered, Some("PO-991")), now()).unwrap();
        assert_eq!(so.supplier_reference.as_deref(), Some("PO-991"));
        assert!(so.ordered_at.is_some());
    }

    #[test]
    fn received_only_after_ordered() {
        let mut so = pending();
        assert!(so.transition(to(SupplierOrderStatus::Received, None), now()).is_err());
        so.transition(to(SupplierOrderStatus::Ordered, Some("PO-1")), now()).unwrap();
        so.transition(to(SupplierOrderStatus::Received, None), now()).unwrap();
        assert!(so.received_at.is_some());
        assert!(all_received(std::slice::from_ref(&so)));
    }

    #[test]
    fn unavailable_can_be_retried() {
        let mut so = pending();
        so.transition(to(SupplierOrderStatus::Ordered, Some("PO-1")), now()).unwrap();
        so.transition(
            SupplierOrderTransition {
                status: SupplierOrderStatus::Unavailable,
                supplier_reference: None,
                notes: Some("out of stock until March".into()),
            },
            now(),
        )
        .unwrap();
        so.transition(to(SupplierOrderStatus::Pending, None), now()).unwrap();
        assert_eq!(so.supplier_reference, None);
        assert_eq!(so.notes.as_deref(), Some("out of stock until March"));
    }

    #[test]
    fn all_received_needs_every_order() {
        let mut a = pending();
        let b = pending();
        a.status = SupplierOrderStatus::Received;
        assert!(!all_received(&[a, b]));
        assert!(!all_received(&[]));
    }
}
