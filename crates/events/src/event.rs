use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "product.published")]
    ProductPublished,
    #[serde(rename = "product.archived")]
    ProductArchived,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.status_changed")]
    OrderStatusChanged,
    #[serde(rename = "supplier_order.updated")]
    SupplierOrderUpdated,
    #[serde(rename = "shipment.updated")]
    ShipmentUpdated,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ProductPublished => "product.published",
            Topic::ProductArchived => "product.archived",
            Topic::OrderCreated => "order.created",
            Topic::OrderStatusChanged => "order.status_changed",
            Topic::SupplierOrderUpdated => "supplier_order.updated",
            Topic::ShipmentUpdated => "shipment.updated",
        }
    }
}

/// A committed change, published after the transaction that produced it.
///
/// Events are facts: consumers must treat them as immutable and tolerate
/// duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub event_id: Uuid,
    pub topic: Topic,
    /// Id of the row that changed (product, order, shipment ...).
    pub entity_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl StoreEvent {
    pub fn new(
        topic: Topic,
        entity_id: impl Into<Uuid>,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            topic,
            entity_id: entity_id.into(),
            occurred_at,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_serializes_dotted() {
        let json = serde_json::to_string(&Topic::SupplierOrderUpdated).unwrap();
        assert_eq!(json, "\"supplier_order.updated\"");
        assert_eq!(Topic::SupplierOrderUpdated.as_str(), "supplier_order.updated");
    }
}
