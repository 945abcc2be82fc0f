//! Shipments and carrier tracking events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::{DomainError, DomainResult, OrderId, ShipmentId, ValidationErrors};

use crate::checkout::Delivery;
use crate::order::Order;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShipmentMethod {
    Courier,
    Locker { locker_code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Created,
    Collected,
    InTransit,
    AtLocker,
    OutForDelivery,
    Delivered,
    Failed,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::Collected => "collected",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::AtLocker => "at_locker",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Failed => "failed",
            ShipmentStatus::Returned => "returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ShipmentStatus::Created),
            "collected" => Some(ShipmentStatus::Collected),
            "in_transit" => Some(ShipmentStatus::InTransit),
            "at_locker" => Some(ShipmentStatus::AtLocker),
            "out_for_delivery" => Some(ShipmentStatus::OutForDelivery),
            "delivered" => Some(ShipmentStatus::Delivered),
            "failed" => Some(ShipmentStatus::Failed),
            "returned" => Some(ShipmentStatus::Returned),
            _ => None,
        }
    }

    /// Progress rank. `Failed` and `Returned` sit outside the ladder.
    fn rank(self) -> Option<u8> {
        match self {
            ShipmentStatus::Created => Some(0),
            ShipmentStatus::Collected => Some(1),
            ShipmentStatus::InTransit => Some(2),
            ShipmentStatus::AtLocker | ShipmentStatus::OutForDelivery => Some(3),
            ShipmentStatus::Delivered => Some(4),
            ShipmentStatus::Failed | ShipmentStatus::Returned => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Returned)
    }

    /// Whether `next` may follow `self` in a shipment's history.
    fn may_precede(self, next: ShipmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            // Failed/Returned can happen at any point.
            (_, None) => true,
            // After a failed attempt the parcel is back in the network.
            (None, Some(n)) => n >= 1,
            (Some(p), Some(n)) => n >= p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: ShipmentStatus,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTrackingEvent {
    pub status: ShipmentStatus,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
    pub method: ShipmentMethod,
    pub status: ShipmentStatus,
    /// Ordered by `occurred_at`.
    pub events: Vec<TrackingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
}

impl Shipment {
    /// The delivery method follows the order's checkout choice.
    pub fn create(new: NewShipment, order: &Order, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut errs = ValidationErrors::new();
        errs.check(new.order_id == order.id, "order_id", "does not match order");
        let carrier = new.carrier.trim().to_string();
        errs.check((1..=80).contains(&carrier.len()), "carrier", "must be 1 to 80 characters");
        let tracking_number = new.tracking_number.trim().to_string();
        errs.check(
            (1..=80).contains(&tracking_number.len()),
            "tracking_number",
            "must be 1 to 80 characters",
        );
        if let Some(url) = &new.tracking_url {
            errs.check(url.starts_with("https://") || url.starts_with("http://"), "tracking_url", "must be an http(s) URL");
        }
        errs.into_result()?;

        let method = match &order.delivery {
            Delivery::Courier { .. } => ShipmentMethod::Courier,
            Delivery::Locker { locker_code } => ShipmentMethod::Locker {
                locker_code: locker_code.clone(),
            },
        };
        Ok(Self {
            id: ShipmentId::new(),
            order_id: order.id,
            carrier,
            tracking_number,
            tracking_url: new.tracking_url,
            method,
            status: ShipmentStatus::Created,
            events: vec![TrackingEvent {
                status: ShipmentStatus::Created,
                description: Some("Shipment created".into()),
                location: None,
                occurred_at: now,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_locker(&self) -> bool {
        matches!(self.method, ShipmentMethod::Locker { .. })
    }

    /// Record a carrier event. Returns `false` when an identical event
    /// (same status and time) was already recorded.
    pub fn record_event(&mut self, new: NewTrackingEvent, now: DateTime<Utc>) -> DomainResult<bool> {
        if new.status == ShipmentStatus::AtLocker && !self.is_locker() {
            return Err(DomainError::validation(
                "status",
                "at_locker is only valid for locker shipments",
            ));
        }
        if new.status == ShipmentStatus::Created {
            return Err(DomainError::validation("status", "shipments are created once"));
        }
        let occurred_at = new.occurred_at.unwrap_or(now);
        if self
            .events
            .iter()
            .any(|e| e.status == new.status && e.occurred_at == occurred_at)
        {
            return Ok(false);
        }

        let event = TrackingEvent {
            status: new.status,
            description: new.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            location: new.location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            occurred_at,
        };
        let at = self.events.partition_point(|e| e.occurred_at <= occurred_at);
        let mut events = self.events.clone();
        events.insert(at, event);

        if let Some(bad) = events.windows(2).find(|w| !w[0].status.may_precede(w[1].status)) {
            return Err(DomainError::invariant(format!(
                "shipment {} cannot go from {} to {}",
                self.tracking_number,
                bad[0].status.as_str(),
                bad[1].status.as_str()
            )));
        }

        self.status = events.last().map_or(self.status, |e| e.status);
        self.events = events;
        self.updated_at = now;
        Ok(true)
    }
}
