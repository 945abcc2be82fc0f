//! In-memory stores for tests and local development.
//!
//! One `RwLock` guards all state, so multi-entity writes (publication,
//! order placement) are applied under a single write guard and either
//! happen completely or not at all: every fallible step runs before the
//! first mutation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use shopfront_catalog::{
    Attribute, AttributeUpdate, DraftPatch, DraftStatus, NewAttributeValue, Product, ProductDetail,
    ProductDraft, ProductFilter, PublicationPlan, PublishOutcome,
};
use shopfront_core::{
    AttributeId, AttributeValueId, CheckoutId, DraftId, ExpectedVersion, OrderId, Page,
    Paged, ProductId, PromotionId, ShipmentId, SupplierOrderId,
};
use shopfront_lockers::Locker;
use shopfront_orders::{
    all_received, Checkout, CheckoutStatus, NewShipment, NewTrackingEvent, Order, OrderPlan,
    OrderStatus, PaymentConfirmation, PlacedOrder, Shipment, ShipmentStatus, StockChange,
    SupplierOrder, SupplierOrderStatus, SupplierOrderTransition,
};
use shopfront_promotions::{Promotion, PromotionUpdate};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    ensure_shippable, referenced_attribute_ids, CatalogStore, LockerStore, OrderChange, OrderStore,
    PromotionStore, ShipmentUpdate, SupplierOrderFilter, SupplierOrderUpdate,
};

#[derive(Debug, Default)]
struct State {
    attributes: HashMap<AttributeId, Attribute>,
    drafts: HashMap<DraftId, ProductDraft>,
    products: HashMap<ProductId, ProductDetail>,
    promotions: HashMap<PromotionId, Promotion>,
    checkouts: HashMap<CheckoutId, Checkout>,
    orders: HashMap<OrderId, Order>,
    order_sequence: u64,
    supplier_orders: HashMap<SupplierOrderId, SupplierOrder>,
    shipments: HashMap<ShipmentId, Shipment>,
    lockers: BTreeMap<String, Locker>,
}

impl State {
    fn attribute_in_use(&self, id: AttributeId) -> bool {
        self.products.values().any(|d| {
            d.attributes.iter().any(|a| a.attribute_id == id)
                || d.variants
                    .iter()
                    .any(|v| v.options.iter().any(|o| o.attribute_id == id))
        })
    }

    fn referenced_attributes(&self, draft: &ProductDraft) -> Vec<Attribute> {
        referenced_attribute_ids(draft)
            .into_iter()
            .filter_map(|id| self.attributes.get(&id).cloned())
            .collect()
    }

    fn code_taken(&self, code: Option<&str>, except: PromotionId) -> bool {
        let Some(code) = code else {
            return false;
        };
        self.promotions
            .values()
            .any(|p| p.id != except && p.code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(code)))
    }

    fn apply_stock_change(&mut self, change: &StockChange, order_number: &str) {
        let Some(detail) = self.products.get_mut(&change.product_id) else {
            warn!(product_id = %change.product_id, order_number, "stock change for unknown product");
            return;
        };
        let stock = match change.variant_id {
            None => Some(&mut detail.product.stock_quantity),
            Some(vid) => detail
                .variants
                .iter_mut()
                .find(|v| v.id == vid)
                .map(|v| &mut v.stock_quantity),
        };
        let Some(stock) = stock else {
            warn!(product_id = %change.product_id, order_number, "stock change for unknown variant");
            return;
        };
        let (next, short) = change.apply_to(*stock);
        if short > 0 {
            warn!(product_id = %change.product_id, order_number, short, "sold more than was in stock");
        }
        *stock = next;
    }
}

/// Conflict message when the slug or a sku belongs to another product.
fn publication_collision<'a>(
    product_id: ProductId,
    slug: &str,
    skus: &[&str],
    others: impl IntoIterator<Item = &'a ProductDetail>,
) -> Option<String> {
    for other in others {
        if other.product.id == product_id {
            continue;
        }
        if other.product.slug == slug {
            return Some(format!("slug '{slug}' is used by product {}", other.product.id));
        }
        let taken = std::iter::once(other.product.sku.as_str())
            .chain(other.variants.iter().map(|v| v.sku.as_str()));
        for sku in taken {
            if skus.iter().any(|s| s.eq_ignore_ascii_case(sku)) {
                return Some(format!("sku '{sku}' is used by product {}", other.product.id));
            }
        }
    }
    None
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".into()))
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, uuid::Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_attributes(&self) -> StoreResult<Vec<Attribute>> {
        let mut attrs: Vec<Attribute> = self.read()?.attributes.values().cloned().collect();
        attrs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(attrs)
    }

    async fn get_attribute(&self, id: AttributeId) -> StoreResult<Attribute> {
        self.read()?.attributes.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn create_attribute(&self, attribute: Attribute) -> StoreResult<()> {
        let mut st = self.write()?;
        if st.attributes.values().any(|a| a.slug == attribute.slug) {
            return Err(StoreError::Conflict(format!(
                "attribute slug '{}' already exists",
                attribute.slug
            )));
        }
        st.attributes.insert(attribute.id, attribute);
        Ok(())
    }

    async fn update_attribute(
        &self,
        id: AttributeId,
        update: AttributeUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute> {
        let mut st = self.write()?;
        let attr = st.attributes.get_mut(&id).ok_or(StoreError::NotFound)?;
        attr.apply_update(update, now)?;
        Ok(attr.clone())
    }

    async fn delete_attribute(&self, id: AttributeId) -> StoreResult<()> {
        let mut st = self.write()?;
        if !st.attributes.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if st.attribute_in_use(id) {
            return Err(StoreError::Conflict(
                "attribute is used by published products".into(),
            ));
        }
        st.attributes.remove(&id);
        Ok(())
    }

    async fn add_attribute_value(
        &self,
        id: AttributeId,
        value: NewAttributeValue,
        now: DateTime<Utc>,
    ) -> StoreResult<(Attribute, AttributeValueId)> {
        let mut st = self.write()?;
        let attr = st.attributes.get_mut(&id).ok_or(StoreError::NotFound)?;
        let value_id = attr.add_value(value, now)?;
        Ok((attr.clone(), value_id))
    }

    async fn remove_attribute_value(
        &self,
        id: AttributeId,
        value_id: AttributeValueId,
        now: DateTime<Utc>,
    ) -> StoreResult<Attribute> {
        let mut st = self.write()?;
        let attr = st.attributes.get(&id).ok_or(StoreError::NotFound)?;
        if !attr.has_value(value_id) {
            return Err(StoreError::NotFound);
        }
        if st.products.values().any(|d| d.has_value(value_id)) {
            return Err(StoreError::Conflict(
                "attribute value is used by published products".into(),
            ));
        }
        let attr = st.attributes.get_mut(&id).ok_or(StoreError::NotFound)?;
        attr.remove_value(value_id, now)?;
        Ok(attr.clone())
    }

    async fn create_draft(&self, draft: ProductDraft) -> StoreResult<()> {
        let mut st = self.write()?;
        if st.drafts.contains_key(&draft.id) {
            return Err(StoreError::Conflict(format!("draft {} already exists", draft.id)));
        }
        st.drafts.insert(draft.id, draft);
        Ok(())
    }

    async fn get_draft(&self, id: DraftId) -> StoreResult<ProductDraft> {
        self.read()?.drafts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_drafts(
        &self,
        status: Option<DraftStatus>,
        page: Page,
    ) -> StoreResult<Paged<ProductDraft>> {
        let mut drafts: Vec<ProductDraft> = self
            .read()?
            .drafts
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        newest_first(&mut drafts, |d| (d.updated_at, *d.id.as_uuid()));
        Ok(page.apply(drafts))
    }

    async fn update_draft(
        &self,
        id: DraftId,
        patch: DraftPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<ProductDraft> {
        let mut st = self.write()?;
        let draft = st.drafts.get_mut(&id).ok_or(StoreError::NotFound)?;
        ExpectedVersion::from_option(patch.expected_version).check(draft.version)?;
        let mut next = draft.clone();
        next.apply_patch(patch, now)?;
        *draft = next.clone();
        Ok(next)
    }

    async fn delete_draft(&self, id: DraftId) -> StoreResult<()> {
        let mut st = self.write()?;
        st.drafts
            .get(&id)
            .ok_or(StoreError::NotFound)?
            .ensure_deletable()?;
        st.drafts.remove(&id);
        Ok(())
    }

    async fn publish_draft(
        &self,
        id: DraftId,
        expected: ExpectedVersion,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome> {
        let mut st = self.write()?;
        let draft = st.drafts.get(&id).cloned().ok_or(StoreError::NotFound)?;
        expected.check(draft.version)?;

        let attributes = st.referenced_attributes(&draft);
        let existing = draft
            .published_product_id
            .and_then(|pid| st.products.get(&pid));
        let plan = PublicationPlan::build(&draft, &attributes, existing, now)?;
        if let Some(msg) = publication_collision(
            plan.product.id,
            &plan.product.slug,
            &plan.skus(),
            st.products.values(),
        ) {
            return Err(StoreError::Conflict(msg));
        }

        let outcome = plan.outcome();
        let mut published = draft;
        published.mark_published(outcome.product_id, now);
        st.products.insert(outcome.product_id, plan.into_detail());
        st.drafts.insert(id, published);

        info!(
            draft_id = %id,
            product_id = %outcome.product_id,
            revision = outcome.revision,
            created = outcome.created,
            "draft published"
        );
        Ok(outcome)
    }

    async fn list_products(
        &self,
        filter: ProductFilter,
        page: Page,
    ) -> StoreResult<Paged<ProductDetail>> {
        let mut products: Vec<ProductDetail> = self
            .read()?
            .products
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        newest_first(&mut products, |d| (d.product.published_at, *d.product.id.as_uuid()));
        Ok(page.apply(products))
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<ProductDetail> {
        self.read()?.products.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<ProductDetail> {
        self.read()?
            .products
            .values()
            .find(|d| d.product.slug == slug)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductDetail>> {
        let st = self.read()?;
        Ok(ids.iter().filter_map(|id| st.products.get(id).cloned()).collect())
    }

    async fn set_product_archived(
        &self,
        id: ProductId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Product> {
        let mut st = self.write()?;
        let detail = st.products.get_mut(&id).ok_or(StoreError::NotFound)?;
        if archived {
            detail.product.archive(now)?;
        } else {
            detail.product.unarchive(now)?;
        }
        Ok(detail.product.clone())
    }
}

#[async_trait]
impl PromotionStore for InMemoryStore {
    async fn list_promotions(&self) -> StoreResult<Vec<Promotion>> {
        let mut promos: Vec<Promotion> = self.read()?.promotions.values().cloned().collect();
        newest_first(&mut promos, |p| (p.created_at, *p.id.as_uuid()));
        Ok(promos)
    }

    async fn get_promotion(&self, id: PromotionId) -> StoreResult<Promotion> {
        self.read()?.promotions.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<()> {
        let mut st = self.write()?;
        if st.code_taken(promotion.code.as_deref(), promotion.id) {
            return Err(StoreError::Conflict("promotion code already exists".into()));
        }
        st.promotions.insert(promotion.id, promotion);
        Ok(())
    }

    async fn update_promotion(
        &self,
        id: PromotionId,
        update: PromotionUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Promotion> {
        let mut st = self.write()?;
        let mut next = st.promotions.get(&id).cloned().ok_or(StoreError::NotFound)?;
        next.apply_update(update, now)?;
        if st.code_taken(next.code.as_deref(), id) {
            return Err(StoreError::Conflict("promotion code already exists".into()));
        }
        st.promotions.insert(id, next.clone());
        Ok(next)
    }

    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()> {
        self.write()?
            .promotions
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn live_promotions(&self, now: DateTime<Utc>) -> StoreResult<Vec<Promotion>> {
        let mut live: Vec<Promotion> = self
            .read()?
            .promotions
            .values()
            .filter(|p| p.is_live(now))
            .cloned()
            .collect();
        live.sort_by_key(|p| p.id);
        Ok(live)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_checkout(&self, checkout: Checkout) -> StoreResult<()> {
        self.write()?.checkouts.insert(checkout.id, checkout);
        Ok(())
    }

    async fn get_checkout(&self, id: CheckoutId) -> StoreResult<Checkout> {
        self.read()?.checkouts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn mark_checkout_failed(
        &self,
        id: CheckoutId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut st = self.write()?;
        let checkout = st.checkouts.get_mut(&id).ok_or(StoreError::NotFound)?;
        Ok(checkout.mark_failed(payment_id, now))
    }

    async fn create_order_from_payment(
        &self,
        checkout_id: CheckoutId,
        payment: PaymentConfirmation,
        now: DateTime<Utc>,
    ) -> StoreResult<PlacedOrder> {
        let mut st = self.write()?;
        if let Some(order) = st.orders.values().find(|o| o.payment_id == payment.payment_id) {
            return Ok(PlacedOrder { order: order.clone(), created: false });
        }

        let mut checkout = st.checkouts.get(&checkout_id).cloned().ok_or(StoreError::NotFound)?;
        if checkout.status == CheckoutStatus::Paid {
            return Err(StoreError::Conflict(format!(
                "checkout {checkout_id} was already paid by another payment"
            )));
        }
        let product_ids: Vec<ProductId> = checkout.lines.iter().map(|l| l.product_id).collect();
        let products: Vec<ProductDetail> = product_ids
            .iter()
            .filter_map(|id| st.products.get(id).cloned())
            .collect();

        let sequence = st.order_sequence + 1;
        let plan = OrderPlan::build(&checkout, &payment, &products, sequence, now)?;
        checkout.mark_paid(&payment.payment_id, now)?;

        let OrderPlan { order, supplier_orders, stock_changes } = plan;
        for change in &stock_changes {
            st.apply_stock_change(change, &order.order_number);
        }
        for pid in &order.promotion_ids {
            if let Some(promo) = st.promotions.get_mut(pid) {
                promo.record_use(now);
            }
        }
        for so in supplier_orders {
            st.supplier_orders.insert(so.id, so);
        }
        st.order_sequence = sequence;
        st.checkouts.insert(checkout.id, checkout);
        st.orders.insert(order.id, order.clone());

        info!(order_id = %order.id, order_number = %order.order_number, %checkout_id, "order created");
        Ok(PlacedOrder { order, created: true })
    }

    async fn refund_order_by_payment(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OrderChange>> {
        let mut st = self.write()?;
        let order = st
            .orders
            .values_mut()
            .find(|o| o.payment_id == payment_id)
            .ok_or(StoreError::NotFound)?;
        if order.status == OrderStatus::Refunded {
            return Ok(None);
        }
        let previous = order.transition(OrderStatus::Refunded, now)?;
        Ok(Some(OrderChange { order: order.clone(), previous }))
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> StoreResult<Paged<Order>> {
        let mut orders: Vec<Order> = self
            .read()?
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        newest_first(&mut orders, |o| (o.created_at, *o.id.as_uuid()));
        Ok(page.apply(orders))
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Order> {
        self.read()?.orders.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_order_by_number(&self, order_number: &str) -> StoreResult<Order> {
        self.read()?
            .orders
            .values()
            .find(|o| o.order_number.eq_ignore_ascii_case(order_number.trim()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn transition_order(
        &self,
        id: OrderId,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderChange> {
        let mut st = self.write()?;
        let order = st.orders.get_mut(&id).ok_or(StoreError::NotFound)?;
        let previous = order.transition(to, now)?;
        Ok(OrderChange { order: order.clone(), previous })
    }

    async fn list_supplier_orders(
        &self,
        filter: SupplierOrderFilter,
        page: Page,
    ) -> StoreResult<Paged<SupplierOrder>> {
        let mut items: Vec<SupplierOrder> = self
            .read()?
            .supplier_orders
            .values()
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .filter(|s| filter.order_id.is_none_or(|id| s.order_id == id))
            .cloned()
            .collect();
        newest_first(&mut items, |s| (s.created_at, *s.id.as_uuid()));
        Ok(page.apply(items))
    }

    async fn transition_supplier_order(
        &self,
        id: SupplierOrderId,
        transition: SupplierOrderTransition,
        now: DateTime<Utc>,
    ) -> StoreResult<SupplierOrderUpdate> {
        let mut st = self.write()?;
        let mut updated = st.supplier_orders.get(&id).cloned().ok_or(StoreError::NotFound)?;
        updated.transition(transition, now)?;
        st.supplier_orders.insert(id, updated.clone());

        let mut order_change = None;
        if updated.status == SupplierOrderStatus::Received {
            let siblings: Vec<SupplierOrder> = st
                .supplier_orders
                .values()
                .filter(|s| s.order_id == updated.order_id)
                .cloned()
                .collect();
            if all_received(&siblings) {
                if let Some(order) = st.orders.get_mut(&updated.order_id) {
                    order_change = order
                        .advance_from(&[OrderStatus::Paid], OrderStatus::Processing, now)
                        .map(|previous| OrderChange { order: order.clone(), previous });
                }
            }
        }

        info!(
            supplier_order_id = %id,
            order_number = %updated.order_number,
            status = updated.status.as_str(),
            "supplier order updated"
        );
        Ok(SupplierOrderUpdate { supplier_order: updated, order_change })
    }

    async fn create_shipment(
        &self,
        new: NewShipment,
        now: DateTime<Utc>,
    ) -> StoreResult<ShipmentUpdate> {
        let mut st = self.write()?;
        let order = st.orders.get_mut(&new.order_id).ok_or(StoreError::NotFound)?;
        ensure_shippable(order)?;
        let shipment = Shipment::create(new, order, now)?;
        let order_change = order
            .advance_from(&[OrderStatus::Paid, OrderStatus::Processing], OrderStatus::Shipped, now)
            .map(|previous| OrderChange { order: order.clone(), previous });
        st.shipments.insert(shipment.id, shipment.clone());
        Ok(ShipmentUpdate { shipment, recorded: true, order_change })
    }

    async fn get_shipment(&self, id: ShipmentId) -> StoreResult<Shipment> {
        self.read()?.shipments.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_shipments(
        &self,
        order_id: Option<OrderId>,
        page: Page,
    ) -> StoreResult<Paged<Shipment>> {
        let mut items: Vec<Shipment> = self
            .read()?
            .shipments
            .values()
            .filter(|s| order_id.is_none_or(|id| s.order_id == id))
            .cloned()
            .collect();
        newest_first(&mut items, |s| (s.created_at, *s.id.as_uuid()));
        Ok(page.apply(items))
    }

    async fn record_shipment_event(
        &self,
        id: ShipmentId,
        event: NewTrackingEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<ShipmentUpdate> {
        let mut st = self.write()?;
        let mut shipment = st.shipments.get(&id).cloned().ok_or(StoreError::NotFound)?;
        let recorded = shipment.record_event(event, now)?;
        if !recorded {
            return Ok(ShipmentUpdate { shipment, recorded, order_change: None });
        }
        st.shipments.insert(id, shipment.clone());

        let mut order_change = None;
        if shipment.status == ShipmentStatus::Delivered {
            let all_delivered = st
                .shipments
                .values()
                .filter(|s| s.order_id == shipment.order_id)
                .all(|s| s.status == ShipmentStatus::Delivered);
            if all_delivered {
                if let Some(order) = st.orders.get_mut(&shipment.order_id) {
                    order_change = order
                        .advance_from(&[OrderStatus::Shipped], OrderStatus::Delivered, now)
                        .map(|previous| OrderChange { order: order.clone(), previous });
                }
            }
        }
        Ok(ShipmentUpdate { shipment, recorded, order_change })
    }
}

#[async_trait]
impl LockerStore for InMemoryStore {
    async fn replace_lockers(&self, lockers: Vec<Locker>) -> StoreResult<usize> {
        let table: BTreeMap<String, Locker> =
            lockers.into_iter().map(|l| (l.code.clone(), l)).collect();
        let count = table.len();
        self.write()?.lockers = table;
        Ok(count)
    }

    async fn list_lockers(&self) -> StoreResult<Vec<Locker>> {
        Ok(self.read()?.lockers.values().cloned().collect())
    }

    async fn get_locker(&self, code: &str) -> StoreResult<Locker> {
        self.read()?.lockers.get(code).cloned().ok_or(StoreError::NotFound)
    }
}
