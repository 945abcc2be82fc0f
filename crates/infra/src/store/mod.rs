//! Persistence ports and their two implementations.
//!
//! Every trait has an in-memory implementation (tests, local development)
//! and a Postgres one. Multi-row writes (publication, order placement) are
//! atomic in both: the in-memory store applies them under one write lock,
//! Postgres inside one transaction.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shopfront_catalog::{
    Attribute, AttributeUpdate, DraftPatch, DraftStatus, NewAttributeValue, Product, ProductDetail,
    ProductDraft, ProductFilter, PublishOutcome,
};
use shopfront_core::{
    AttributeId, AttributeValueId, CheckoutId, DomainError, DraftId, ExpectedVersion, OrderId, Page,
    Paged, ProductId, PromotionId, ShipmentId, SupplierOrderId,
};
use shopfront_lockers::Locker;
use shopfront_orders::{
    Checkout, NewShipment, NewTrackingEvent, Order, OrderStatus, PaymentConfirmation, PlacedOrder,
    Shipment, SupplierOrder, SupplierOrderStatus, SupplierOrderTransition,
};
use shopfront_promotions::{Promotion, PromotionUpdate};

use crate::error::StoreResult;

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub(crate) mod fixtures;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// An order status move made by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub order: Order,
    pub previous: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierOrderUpdate {
    pub supplier_order: SupplierOrder,
    /// Set when the last receipt moved the order to processing.
    pub order_change: Option<OrderChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentUpdate {
    pub shipment: Shipment,
    /// `false` for a duplicate tracking event.
    pub recorded: bool,
    pub order_change: Option<OrderChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplierOrderFilter {
    pub status: Option<SupplierOrderStatus>,
    pub order_id: Option<OrderId>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_attributes(&self) -> StoreResult<Vec<Attribute>>;
    async fn get_attribute(&self, id: AttributeId) -> StoreResult<Attribute>;
    /// `Conflict` when the slug is taken.
    async fn create_attribute(&self, attribute: Attribute) -> StoreResult<()>;
    async fn update_attribute(
        &self,
        id: AttributeId,
        update: AttributeUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute>;
    /// `Conflict` when a published product uses the attribute.
    async fn delete_attribute(&self, id: AttributeId) -> StoreResult<()>;
    /// `Conflict` when the value already exists on the attribute.
    async fn add_attribute_value(
        &self,
        id: AttributeId,
        value: NewAttributeValue,
        now: DateTime<Utc>,
    ) -> StoreResult<(Attribute, AttributeValueId)>;
    /// `Conflict` when a published product uses the value.
    async fn remove_attribute_value(
        &self,
        id: AttributeId,
        value_id: AttributeValueId,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute>;

    async fn create_draft(&self, draft: ProductDraft) -> StoreResult<()>;
    async fn get_draft(&self, id: DraftId) -> StoreResult<ProductDraft>;
    async fn list_drafts(
        &self,
        status: Option<DraftStatus>,
        page: Page,
    ) -> StoreResult<Paged<ProductDraft>>;
    /// Apply a wizard edit, checking `patch.expected_version` first.
    async fn update_draft(
        &self,
        id: DraftId,
        patch: DraftPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<ProductDraft>;
    async fn delete_draft(&self, id: DraftId) -> StoreResult<()>;

    /// Publish a draft atomically. Republishing updates the same product.
    async fn publish_draft(
        &self,
        id: DraftId,
        expected: ExpectedVersion,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome>;

    async fn list_products(
        &self,
        filter: ProductFilter,
        page: Page,
    ) -> StoreResult<Paged<ProductDetail>>;
    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetail>;
    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<ProductDetail>;
    /// Missing ids are skipped.
    async fn products_by_ids(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductDetail>>;
    async fn set_product_archived(
        &self,
        id: ProductId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Product>;
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn list_promotions(&self) -> StoreResult<Vec<Promotion>>;
    async fn get_promotion(&self, id: PromotionId) -> StoreResult<Promotion>;
    /// `Conflict` when the code is taken.
    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<()>;
    async fn update_promotion(
        &self,
        id: PromotionId,
        update: PromotionUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Promotion>;
    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()>;
    /// Active promotions whose window contains `now`.
    async fn live_promotions(&self, now: DateTime<Utc>) -> StoreResult<Vec<Promotion>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_checkout(&self, checkout: Checkout) -> StoreResult<()>;
    async fn get_checkout(&self, id: CheckoutId) -> StoreResult<Checkout>;
    /// `Ok(false)` when the checkout was not pending.
    async fn mark_checkout_failed(
        &self,
        id: CheckoutId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Turn a confirmed payment into an order, atomically and at most once
    /// per payment id.
    async fn create_order_from_payment(
        &self,
        checkout_id: CheckoutId,
        payment: PaymentConfirmation,
        now: DateTime<Utc>,
    ) -> StoreResult<PlacedOrder>;
    /// `Ok(None)` when the order is already refunded.
    async fn refund_order_by_payment(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OrderChange>>;

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> StoreResult<Paged<Order>>;
    async fn get_order(&self, id: OrderId) -> StoreResult<Order>;
    async fn get_order_by_number(&self, order_number: &str) -> StoreResult<Order>;
    async fn transition_order(
        &self,
        id: OrderId,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderChange>;

    async fn list_supplier_orders(
        &self,
        filter: SupplierOrderFilter,
        page: Page,
    ) -> StoreResult<Paged<SupplierOrder>>;
    async fn transition_supplier_order(
        &self,
        id: SupplierOrderId,
        transition: SupplierOrderTransition,
        now: DateTime<Utc>,
    ) -> StoreResult<SupplierOrderUpdate>;

    /// Create a shipment and move a paid/processing order to shipped.
    async fn create_shipment(&self, new: NewShipment, now: DateTime<Utc>)
        -> StoreResult<ShipmentUpdate>;
    async fn get_shipment(&self, id: ShipmentId) -> StoreResult<Shipment>;
    async fn list_shipments(
        &self,
        order_id: Option<OrderId>,
        page: Page,
    ) -> StoreResult<Paged<Shipment>>;
    /// Append a tracking event. The order becomes delivered once every one
    /// of its shipments is.
    async fn record_shipment_event(
        &self,
        id: ShipmentId,
        event: NewTrackingEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<ShipmentUpdate>;
}

#[async_trait]
pub trait LockerStore: Send + Sync {
    /// Swap the whole locker table; returns the new row count.
    async fn replace_lockers(&self, lockers: Vec<Locker>) -> StoreResult<usize>;
    async fn list_lockers(&self) -> StoreResult<Vec<Locker>>;
    async fn get_locker(&self, code: &str) -> StoreResult<Locker>;
}

/// The four stores as the API holds them.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub promotions: Arc<dyn PromotionStore>,
    pub orders: Arc<dyn OrderStore>,
    pub lockers: Arc<dyn LockerStore>,
}

impl Stores {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogStore + PromotionStore + OrderStore + LockerStore + 'static,
    {
        Self {
            catalog: store.clone(),
            promotions: store.clone(),
            orders: store.clone(),
            lockers: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_shared(Arc::new(InMemoryStore::new()))
    }
}

/// Attribute ids a draft refers to, through attribute rows and variant options.
pub(crate) fn referenced_attribute_ids(draft: &ProductDraft) -> Vec<AttributeId> {
    let mut seen = HashSet::new();
    draft
        .attributes
        .iter()
        .map(|a| a.attribute_id)
        .chain(
            draft
                .variants
                .iter()
                .flat_map(|v| v.options.iter().map(|o| o.attribute_id)),
        )
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Shipments can be added while an order is paid, processing or shipped.
pub(crate) fn ensure_shippable(order: &Order) -> Result<(), DomainError> {
    match order.status {
        OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped => Ok(()),
        other => Err(DomainError::invariant(format!(
            "order {} is {} and cannot be shipped",
            order.order_number,
            other.as_str()
        ))),
    }
}
