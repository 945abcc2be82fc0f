//! Checkouts, orders, supplier orders and shipments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shopfront_core::{CheckoutId, OrderId, Page, Paged, ShipmentId, SupplierOrderId};
use shopfront_orders::{
    all_received, Checkout, CheckoutStatus, NewShipment, NewTrackingEvent, Order, OrderPlan,
    OrderStatus, PaymentConfirmation, PlacedOrder, Shipment, ShipmentStatus, StockChange,
    SupplierOrder, SupplierOrderStatus, SupplierOrderTransition,
};
use shopfront_promotions::Promotion;

use super::catalog::fetch_details;
use super::promotions::write_promotion;
use super::{bodies, finish, get_body, PgStore};
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::store::{
    ensure_shippable, OrderChange, OrderStore, ShipmentUpdate, SupplierOrderFilter,
    SupplierOrderUpdate,
};

/// Fetch one JSONB document by id, optionally locking the row.
async fn fetch_doc<T: serde::de::DeserializeOwned>(
    conn: &mut PgConnection,
    table: &str,
    id: Uuid,
    for_update: bool,
) -> StoreResult<T> {
    let sql = format!(
        "SELECT body FROM {table} WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(table, e))?
        .ok_or(StoreError::NotFound)?;
    get_body(&row).map_err(|e| map_sqlx_error(table, e))
}

/// SQL that locks the order owning a row of `child_table`.
fn parent_lock_sql(child_table: &str) -> String {
    format!(
        "SELECT o.id FROM orders o JOIN {child_table} c ON c.order_id = o.id \
         WHERE c.id = $1 FOR UPDATE OF o"
    )
}

/// Lock the parent order of a supplier order or shipment. Must be taken
/// before the child row; sibling reads happen under this lock.
async fn lock_parent_order(conn: &mut PgConnection, child_table: &str, child_id: Uuid) -> StoreResult<()> {
    sqlx::query(&parent_lock_sql(child_table))
        .bind(child_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(child_table, e))?
        .ok_or(StoreError::NotFound)?;
    Ok(())
}

async fn write_checkout(conn: &mut PgConnection, checkout: &Checkout) -> StoreResult<()> {
    sqlx::query("UPDATE checkouts SET status = $2, body = $3, updated_at = $4 WHERE id = $1")
        .bind(checkout.id.as_uuid())
        .bind(checkout.status.as_str())
        .bind(Json(checkout))
        .bind(checkout.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_checkout", e))?;
    Ok(())
}

async fn write_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    sqlx::query("UPDATE orders SET status = $2, body = $3, updated_at = $4 WHERE id = $1")
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_order", e))?;
    Ok(())
}

async fn write_supplier_order(conn: &mut PgConnection, so: &SupplierOrder) -> StoreResult<()> {
    sqlx::query("UPDATE supplier_orders SET status = $2, body = $3, updated_at = $4 WHERE id = $1")
        .bind(so.id.as_uuid())
        .bind(so.status.as_str())
        .bind(Json(so))
        .bind(so.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_supplier_order", e))?;
    Ok(())
}

async fn write_shipment(conn: &mut PgConnection, shipment: &Shipment) -> StoreResult<()> {
    sqlx::query("UPDATE shipments SET status = $2, body = $3, updated_at = $4 WHERE id = $1")
        .bind(shipment.id.as_uuid())
        .bind(shipment.status.as_str())
        .bind(Json(shipment))
        .bind(shipment.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_shipment", e))?;
    Ok(())
}

async fn order_by_payment(conn: &mut PgConnection, payment_id: &str) -> StoreResult<Option<Order>> {
    let row = sqlx::query("SELECT body FROM orders WHERE payment_id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("order_by_payment", e))?;
    row.map(|r| get_body(&r))
        .transpose()
        .map_err(|e| map_sqlx_error("order_by_payment", e))
}

/// Take sold units off a product or variant, floored at zero.
async fn apply_stock_change(
    conn: &mut PgConnection,
    change: &StockChange,
    order_number: &str,
) -> StoreResult<()> {
    let op = "apply_stock_change";
    let row = match change.variant_id {
        None => sqlx::query("SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE")
            .bind(change.product_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await,
        Some(vid) => sqlx::query(
            "SELECT stock_quantity FROM product_variants WHERE id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(vid.as_uuid())
        .bind(change.product_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await,
    }
    .map_err(|e| map_sqlx_error(op, e))?;

    let Some(row) = row else {
        warn!(product_id = %change.product_id, order_number, "stock change for unknown product or variant");
        return Ok(());
    };
    let current: i64 = row.try_get("stock_quantity").map_err(|e| map_sqlx_error(op, e))?;
    let (next, short) = change.apply_to(current);
    if short > 0 {
        warn!(product_id = %change.product_id, order_number, short, "sold more than was in stock");
    }

    let update = match change.variant_id {
        None => sqlx::query("UPDATE products SET stock_quantity = $2 WHERE id = $1")
            .bind(change.product_id.as_uuid())
            .bind(next),
        Some(vid) => sqlx::query("UPDATE product_variants SET stock_quantity = $2 WHERE id = $1")
            .bind(*vid.as_uuid())
            .bind(next),
    };
    update
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
    Ok(())
}

async fn next_order_sequence(conn: &mut PgConnection) -> StoreResult<u64> {
    let seq: i64 = sqlx::query("SELECT nextval('order_number_seq') AS seq")
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| row.try_get("seq"))
        .map_err(|e| map_sqlx_error("next_order_sequence", e))?;
    Ok(seq.max(0).unsigned_abs())
}

async fn place_order(
    conn: &mut PgConnection,
    checkout_id: CheckoutId,
    payment: PaymentConfirmation,
    now: DateTime<Utc>,
) -> StoreResult<PlacedOrder> {
    if let Some(order) = order_by_payment(conn, &payment.payment_id).await? {
        return Ok(PlacedOrder { order, created: false });
    }
    let mut checkout: Checkout = fetch_doc(conn, "checkouts", checkout_id.into(), true).await?;
    // A concurrent delivery of the same payment may have committed while we
    // waited for the checkout lock.
    if let Some(order) = order_by_payment(conn, &payment.payment_id).await? {
        return Ok(PlacedOrder { order, created: false });
    }
    if checkout.status == CheckoutStatus::Paid {
        return Err(StoreError::Conflict(format!(
            "checkout {checkout_id} was already paid by another payment"
        )));
    }

    let product_ids: Vec<Uuid> = checkout
        .lines
        .iter()
        .map(|l| Uuid::from(l.product_id))
        .collect();
    let products = fetch_details(conn, &product_ids).await?;

    // Validate before consuming a sequence number.
    checkout.verify_payment(&payment)?;
    let sequence = next_order_sequence(conn).await?;
    let plan = OrderPlan::build(&checkout, &payment, &products, sequence, now)?;
    checkout.mark_paid(&payment.payment_id, now)?;

    let OrderPlan { order, supplier_orders, stock_changes } = plan;
    sqlx::query(
        r#"
        INSERT INTO orders (id, order_number, checkout_id, payment_id, status, body, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(&order.order_number)
    .bind(order.checkout_id.as_uuid())
    .bind(&order.payment_id)
    .bind(order.status.as_str())
    .bind(Json(&order))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;

    for change in &stock_changes {
        apply_stock_change(conn, change, &order.order_number).await?;
    }

    for pid in &order.promotion_ids {
        match fetch_doc::<Promotion>(conn, "promotions", (*pid).into(), true).await {
            Ok(mut promo) => {
                promo.record_use(now);
                write_promotion(conn, &promo).await?;
            }
            Err(StoreError::NotFound) => {
                warn!(promotion_id = %pid, order_number = %order.order_number, "applied promotion no longer exists");
            }
            Err(err) => return Err(err),
        }
    }

    for so in &supplier_orders {
        sqlx::query(
            r#"
            INSERT INTO supplier_orders (id, order_id, status, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(so.id.as_uuid())
        .bind(so.order_id.as_uuid())
        .bind(so.status.as_str())
        .bind(Json(so))
        .bind(so.created_at)
        .bind(so.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_supplier_order", e))?;
    }

    write_checkout(conn, &checkout).await?;
    Ok(PlacedOrder { order, created: true })
}

async fn advance_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    from: &[OrderStatus],
    to: OrderStatus,
    now: DateTime<Utc>,
) -> StoreResult<Option<OrderChange>> {
    let mut order: Order = fetch_doc(conn, "orders", order_id.into(), true).await?;
    let Some(previous) = order.advance_from(from, to, now) else {
        return Ok(None);
    };
    write_order(conn, &order).await?;
    Ok(Some(OrderChange { order, previous }))
}

async fn update_supplier_order(
    conn: &mut PgConnection,
    id: SupplierOrderId,
    transition: SupplierOrderTransition,
    now: DateTime<Utc>,
) -> StoreResult<SupplierOrderUpdate> {
    lock_parent_order(conn, "supplier_orders", id.into()).await?;
    let mut updated: SupplierOrder = fetch_doc(conn, "supplier_orders", id.into(), true).await?;
    updated.transition(transition, now)?;
    write_supplier_order(conn, &updated).await?;

    let mut order_change = None;
    if updated.status == SupplierOrderStatus::Received {
        let rows = sqlx::query("SELECT body FROM supplier_orders WHERE order_id = $1")
            .bind(updated.order_id.as_uuid())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("sibling_supplier_orders", e))?;
        let siblings: Vec<SupplierOrder> = bodies(&rows, "sibling_supplier_orders")?;
        if all_received(&siblings) {
            order_change = advance_order(
                conn,
                updated.order_id,
                &[OrderStatus::Paid],
                OrderStatus::Processing,
                now,
            )
            .await?;
        }
    }
    Ok(SupplierOrderUpdate { supplier_order: updated, order_change })
}

async fn add_shipment(
    conn: &mut PgConnection,
    new: NewShipment,
    now: DateTime<Utc>,
) -> StoreResult<ShipmentUpdate> {
    let mut order: Order = fetch_doc(conn, "orders", new.order_id.into(), true).await?;
    ensure_shippable(&order)?;
    let shipment = Shipment::create(new, &order, now)?;
    sqlx::query(
        r#"
        INSERT INTO shipments (id, order_id, status, body, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(shipment.id.as_uuid())
    .bind(shipment.order_id.as_uuid())
    .bind(shipment.status.as_str())
    .bind(Json(&shipment))
    .bind(shipment.created_at)
    .bind(shipment.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_shipment", e))?;

    let order_change = match order.advance_from(
        &[OrderStatus::Paid, OrderStatus::Processing],
        OrderStatus::Shipped,
        now,
    ) {
        Some(previous) => {
            write_order(conn, &order).await?;
            Some(OrderChange { order, previous })
        }
        None => None,
    };
    Ok(ShipmentUpdate { shipment, recorded: true, order_change })
}

async fn track_shipment(
    conn: &mut PgConnection,
    id: ShipmentId,
    event: NewTrackingEvent,
    now: DateTime<Utc>,
) -> StoreResult<ShipmentUpdate> {
    lock_parent_order(conn, "shipments", id.into()).await?;
    let mut shipment: Shipment = fetch_doc(conn, "shipments", id.into(), true).await?;
    let recorded = shipment.record_event(event, now)?;
    if !recorded {
        return Ok(ShipmentUpdate { shipment, recorded, order_change: None });
    }
    write_shipment(conn, &shipment).await?;

    let mut order_change = None;
    if shipment.status == ShipmentStatus::Delivered {
        let pending: i64 = sqlx::query(
            "SELECT COUNT(*) AS pending FROM shipments WHERE order_id = $1 AND status <> $2",
        )
        .bind(shipment.order_id.as_uuid())
        .bind(ShipmentStatus::Delivered.as_str())
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| row.try_get("pending"))
        .map_err(|e| map_sqlx_error("pending_shipments", e))?;
        if pending == 0 {
            order_change = advance_order(
                conn,
                shipment.order_id,
                &[OrderStatus::Shipped],
                OrderStatus::Delivered,
                now,
            )
            .await?;
        }
    }
    Ok(ShipmentUpdate { shipment, recorded, order_change })
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, checkout), fields(checkout_id = %checkout.id), err)]
    async fn create_checkout(&self, checkout: Checkout) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO checkouts (id, status, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(checkout.id.as_uuid())
        .bind(checkout.status.as_str())
        .bind(Json(&checkout))
        .bind(checkout.created_at)
        .bind(checkout.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_checkout", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(checkout_id = %id), err)]
    async fn get_checkout(&self, id: CheckoutId) -> StoreResult<Checkout> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_checkout", e))?;
        fetch_doc(&mut conn, "checkouts", id.into(), false).await
    }

    #[instrument(skip(self), fields(checkout_id = %id), err)]
    async fn mark_checkout_failed(
        &self,
        id: CheckoutId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.begin("mark_checkout_failed").await?;
        let result: StoreResult<_> = async {
            let mut checkout: Checkout = fetch_doc(&mut tx, "checkouts", id.into(), true).await?;
            let changed = checkout.mark_failed(payment_id, now);
            if changed {
                write_checkout(&mut tx, &checkout).await?;
            }
            Ok(changed)
        }
        .await;
        finish(tx, result, "mark_checkout_failed").await
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id), err)]
    async fn create_order_from_payment(
        &self,
        checkout_id: CheckoutId,
        payment: PaymentConfirmation,
        now: DateTime<Utc>,
    ) -> StoreResult<PlacedOrder> {
        let mut tx = self.begin("create_order_from_payment").await?;
        let result = place_order(&mut tx, checkout_id, payment, now).await;
        let placed = finish(tx, result, "create_order_from_payment").await?;
        if placed.created {
            info!(
                order_id = %placed.order.id,
                order_number = %placed.order.order_number,
                %checkout_id,
                "order created"
            );
        }
        Ok(placed)
    }

    #[instrument(skip(self), err)]
    async fn refund_order_by_payment(
        &self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OrderChange>> {
        let mut tx = self.begin("refund_order_by_payment").await?;
        let result: StoreResult<_> = async {
            let mut order = order_by_payment(&mut tx, payment_id)
                .await?
                .ok_or(StoreError::NotFound)?;
            if order.status == OrderStatus::Refunded {
                return Ok(None);
            }
            let previous = order.transition(OrderStatus::Refunded, now)?;
            write_order(&mut tx, &order).await?;
            Ok(Some(OrderChange { order, previous }))
        }
        .await;
        finish(tx, result, "refund_order_by_payment").await
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, status: Option<OrderStatus>, page: Page) -> StoreResult<Paged<Order>> {
        let status = status.map(|s| s.as_str());
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM orders WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        let rows = sqlx::query(
            r#"
            SELECT body FROM orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        Ok(Paged::new(bodies(&rows, "list_orders")?, total.max(0).unsigned_abs(), page))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<Order> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_order", e))?;
        fetch_doc(&mut conn, "orders", id.into(), false).await
    }

    #[instrument(skip(self), err)]
    async fn get_order_by_number(&self, order_number: &str) -> StoreResult<Order> {
        let row = sqlx::query("SELECT body FROM orders WHERE upper(order_number) = upper($1)")
            .bind(order_number.trim())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order_by_number", e))?
            .ok_or(StoreError::NotFound)?;
        get_body(&row).map_err(|e| map_sqlx_error("get_order_by_number", e))
    }

    #[instrument(skip(self), fields(order_id = %id, to = to.as_str()), err)]
    async fn transition_order(
        &self,
        id: OrderId,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderChange> {
        let mut tx = self.begin("transition_order").await?;
        let result: StoreResult<_> = async {
            let mut order: Order = fetch_doc(&mut tx, "orders", id.into(), true).await?;
            let previous = order.transition(to, now)?;
            write_order(&mut tx, &order).await?;
            Ok(OrderChange { order, previous })
        }
        .await;
        finish(tx, result, "transition_order").await
    }

    #[instrument(skip(self), err)]
    async fn list_supplier_orders(
        &self,
        filter: SupplierOrderFilter,
        page: Page,
    ) -> StoreResult<Paged<SupplierOrder>> {
        let status = filter.status.map(|s| s.as_str());
        let order_id = filter.order_id.map(Uuid::from);
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM supplier_orders \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR order_id = $2)",
        )
        .bind(status)
        .bind(order_id)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| map_sqlx_error("list_supplier_orders", e))?;
        let rows = sqlx::query(
            r#"
            SELECT body FROM supplier_orders
            WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR order_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(order_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_supplier_orders", e))?;
        Ok(Paged::new(bodies(&rows, "list_supplier_orders")?, total.max(0).unsigned_abs(), page))
    }

    #[instrument(skip(self, transition), fields(supplier_order_id = %id), err)]
    async fn transition_supplier_order(
        &self,
        id: SupplierOrderId,
        transition: SupplierOrderTransition,
        now: DateTime<Utc>,
    ) -> StoreResult<SupplierOrderUpdate> {
        let mut tx = self.begin("transition_supplier_order").await?;
        let result = update_supplier_order(&mut tx, id, transition, now).await;
        let update = finish(tx, result, "transition_supplier_order").await?;
        info!(
            supplier_order_id = %id,
            order_number = %update.supplier_order.order_number,
            status = update.supplier_order.status.as_str(),
            "supplier order updated"
        );
        Ok(update)
    }

    #[instrument(skip(self, new), fields(order_id = %new.order_id), err)]
    async fn create_shipment(&self, new: NewShipment, now: DateTime<Utc>) -> StoreResult<ShipmentUpdate> {
        let mut tx = self.begin("create_shipment").await?;
        let result = add_shipment(&mut tx, new, now).await;
        finish(tx, result, "create_shipment").await
    }

    #[instrument(skip(self), fields(shipment_id = %id), err)]
    async fn get_shipment(&self, id: ShipmentId) -> StoreResult<Shipment> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_shipment", e))?;
        fetch_doc(&mut conn, "shipments", id.into(), false).await
    }

    #[instrument(skip(self), err)]
    async fn list_shipments(
        &self,
        order_id: Option<OrderId>,
        page: Page,
    ) -> StoreResult<Paged<Shipment>> {
        let order_id = order_id.map(Uuid::from);
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM shipments WHERE ($1::uuid IS NULL OR order_id = $1)",
        )
        .bind(order_id)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| map_sqlx_error("list_shipments", e))?;
        let rows = sqlx::query(
            r#"
            SELECT body FROM shipments
            WHERE ($1::uuid IS NULL OR order_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(order_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_shipments", e))?;
        Ok(Paged::new(bodies(&rows, "list_shipments")?, total.max(0).unsigned_abs(), page))
    }

    #[instrument(skip(self, event), fields(shipment_id = %id), err)]
    async fn record_shipment_event(
        &self,
        id: ShipmentId,
        event: NewTrackingEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<ShipmentUpdate> {
        let mut tx = self.begin("record_shipment_event").await?;
        let result = track_shipment(&mut tx, id, event, now).await;
        finish(tx, result, "record_shipment_event").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfront_core::ExpectedVersion;

    use super::super::scratch_store;
    use crate::store::fixtures::*;
    use crate::store::{CatalogStore, SupplierOrderFilter};

    #[test]
    fn parent_lock_targets_the_order_row() {
        let sql = parent_lock_sql("shipments");
        assert!(sql.contains("JOIN shipments c ON c.order_id = o.id"));
        assert!(sql.ends_with("FOR UPDATE OF o"));
    }

    fn tracking(status: ShipmentStatus, secs: i64) -> NewTrackingEvent {
        NewTrackingEvent { status, description: None, location: None, occurred_at: Some(at(secs)) }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_last_children_still_advance_the_order() {
        let Some(store) = scratch_store().await else {
            eprintln!("SHOPFRONT_TEST_DATABASE_URL not set; skipping");
            return;
        };
        let (first, attrs) = seeded_draft(&store).await;
        let second = draft_with(&store, &attrs, "Glazed bowl", "BWL-1", "glazed-bowl").await;
        let mut products = Vec::new();
        for draft in [first, second] {
            let outcome = store.publish_draft(draft.id, ExpectedVersion::Any, at(1)).await.unwrap();
            products.push(store.get_product(outcome.product_id).await.unwrap());
        }
        let checkout = checkout_for_each(&store, &products).await;
        let order = store
            .create_order_from_payment(checkout.id, payment_for(&checkout, "pay_pg_1"), at(100))
            .await
            .unwrap()
            .order;

        let filter = SupplierOrderFilter { status: None, order_id: Some(order.id) };
        let supplier_orders = store.list_supplier_orders(filter, Page::default()).await.unwrap();
        assert_eq!(supplier_orders.items.len(), 2);
        for so in &supplier_orders.items {
            let ordered = SupplierOrderTransition {
                status: SupplierOrderStatus::Ordered,
                supplier_reference: Some(format!("REF-{}", so.id)),
                notes: None,
            };
            store.transition_supplier_order(so.id, ordered, at(110)).await.unwrap();
        }

        let receive = |id| {
            let store = store.clone();
            async move {
                let received = SupplierOrderTransition {
                    status: SupplierOrderStatus::Received,
                    supplier_reference: None,
                    notes: None,
                };
                store.transition_supplier_order(id, received, at(120)).await.unwrap()
            }
        };
        let (a, b) = tokio::join!(
            receive(supplier_orders.items[0].id),
            receive(supplier_orders.items[1].id)
        );
        assert_eq!(usize::from(a.order_change.is_some()) + usize::from(b.order_change.is_some()), 1);
        assert_eq!(store.get_order(order.id).await.unwrap().status, OrderStatus::Processing);

        let mut shipment_ids = Vec::new();
        for number in ["TCG-1", "TCG-2"] {
            let new = NewShipment {
                order_id: order.id,
                carrier: "The Courier Guy".into(),
                tracking_number: number.into(),
                tracking_url: None,
            };
            shipment_ids.push(store.create_shipment(new, at(130)).await.unwrap().shipment.id);
        }
        assert_eq!(store.get_order(order.id).await.unwrap().status, OrderStatus::Shipped);

        let deliver = |id| {
            let store = store.clone();
            async move {
                store
                    .record_shipment_event(id, tracking(ShipmentStatus::Delivered, 200), at(201))
                    .await
                    .unwrap()
            }
        };
        let (a, b) = tokio::join!(deliver(shipment_ids[0]), deliver(shipment_ids[1]));
        assert_eq!(usize::from(a.order_change.is_some()) + usize::from(b.order_change.is_some()), 1);
        assert_eq!(store.get_order(order.id).await.unwrap().status, OrderStatus::Delivered);
    }
}
