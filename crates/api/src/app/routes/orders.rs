//! Admin fulfilment: orders, supplier orders and shipments.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use shopfront_core::{OrderId, Page, ShipmentId, SupplierOrderId};
use shopfront_events::Topic;
use shopfront_infra::{OrderChange, SupplierOrderFilter};
use shopfront_orders::{NewShipment, NewTrackingEvent, SupplierOrderTransition};

use crate::app::dto::{self, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn orders_router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", post(change_status))
}

pub fn supplier_orders_router() -> Router {
    Router::new()
        .route("/", get(list_supplier_orders))
        .route("/:id/transition", post(transition_supplier_order))
}

pub fn shipments_router() -> Router {
    Router::new()
        .route("/", get(list_shipments).post(create_shipment))
        .route("/:id", get(get_shipment))
        .route("/:id/events", post(record_event))
}

/// Publish an order status move made by the store.
pub(crate) fn emit_order_change(services: &AppServices, change: &OrderChange) {
    info!(
        order_id = %change.order.id,
        from = change.previous.as_str(),
        to = change.order.status.as_str(),
        "order status changed"
    );
    services.emit(
        Topic::OrderStatusChanged,
        change.order.id,
        &json!({
            "order_id": change.order.id,
            "order_number": change.order.order_number,
            "from": change.previous,
            "to": change.order.status,
        }),
    );
}

// Orders

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::OrderListQuery>,
) -> ApiResult {
    authz::require(&principal, "orders.read")?;
    let orders = services
        .stores
        .orders
        .list_orders(q.status, Page::new(q.limit, q.offset))
        .await?;
    Ok(Json(orders).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "orders.read")?;
    let id: OrderId = parse_id(&id)?;
    let order = services.stores.orders.get_order(id).await?;
    Ok(Json(order).into_response())
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderStatusRequest>,
) -> ApiResult {
    authz::require(&principal, "orders.write")?;
    let id: OrderId = parse_id(&id)?;
    let change = services
        .stores
        .orders
        .transition_order(id, body.status, Utc::now())
        .await?;
    emit_order_change(&services, &change);
    Ok(Json(change.order).into_response())
}

// Supplier orders

pub async fn list_supplier_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::SupplierOrderListQuery>,
) -> ApiResult {
    authz::require(&principal, "supplier_orders.read")?;
    let filter = SupplierOrderFilter { status: q.status, order_id: q.order_id };
    let supplier_orders = services
        .stores
        .orders
        .list_supplier_orders(filter, Page::new(q.limit, q.offset))
        .await?;
    Ok(Json(supplier_orders).into_response())
}

pub async fn transition_supplier_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<SupplierOrderTransition>,
) -> ApiResult {
    authz::require(&principal, "supplier_orders.write")?;
    let id: SupplierOrderId = parse_id(&id)?;
    let update = services
        .stores
        .orders
        .transition_supplier_order(id, body, Utc::now())
        .await?;

    let so = &update.supplier_order;
    services.emit(Topic::SupplierOrderUpdated, so.id, so);
    if let Some(change) = &update.order_change {
        emit_order_change(&services, change);
    }
    Ok(Json(update.supplier_order).into_response())
}

// Shipments

pub async fn list_shipments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::ShipmentListQuery>,
) -> ApiResult {
    authz::require(&principal, "shipments.read")?;
    let shipments = services
        .stores
        .orders
        .list_shipments(q.order_id, Page::new(q.limit, q.offset))
        .await?;
    Ok(Json(shipments).into_response())
}

pub async fn create_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewShipment>,
) -> ApiResult {
    authz::require(&principal, "shipments.write")?;
    let update = services
        .stores
        .orders
        .create_shipment(body, Utc::now())
        .await?;

    let shipment = &update.shipment;
    info!(
        shipment_id = %shipment.id,
        order_id = %shipment.order_id,
        carrier = %shipment.carrier,
        "shipment created"
    );
    services.emit(Topic::ShipmentUpdated, shipment.id, shipment);
    if let Some(change) = &update.order_change {
        emit_order_change(&services, change);
    }
    Ok((StatusCode::CREATED, Json(update.shipment)).into_response())
}

pub async fn get_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "shipments.read")?;
    let id: ShipmentId = parse_id(&id)?;
    let shipment = services.stores.orders.get_shipment(id).await?;
    Ok(Json(shipment).into_response())
}

/// POST /admin/shipments/:id/events
///
/// `recorded: false` means the event was a duplicate and nothing changed.
pub async fn record_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewTrackingEvent>,
) -> ApiResult {
    authz::require(&principal, "shipments.write")?;
    let id: ShipmentId = parse_id(&id)?;
    let update = services
        .stores
        .orders
        .record_shipment_event(id, body, Utc::now())
        .await?;

    if update.recorded {
        services.emit(Topic::ShipmentUpdated, update.shipment.id, &update.shipment);
    }
    if let Some(change) = &update.order_change {
        emit_order_change(&services, change);
    }
    Ok(Json(json!({ "recorded": update.recorded, "shipment": update.shipment })).into_response())
}
