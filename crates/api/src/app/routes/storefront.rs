//! Public shop endpoints: catalog browsing, checkout and order tracking.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use shopfront_core::{CheckoutId, DomainError, Page, ProductId};
use shopfront_core::page::MAX_PAGE_LIMIT;
use shopfront_infra::StoreError;
use shopfront_orders::{Checkout, NewCheckout, OrderTracking};

use crate::app::dto::{self, parse_id, StorefrontProduct};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;

pub fn products_router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/:slug", get(get_product))
}

pub fn checkouts_router() -> Router {
    Router::new()
        .route("/", post(create_checkout))
        .route("/:id", get(get_checkout))
}

pub fn orders_router() -> Router {
    Router::new().route("/:order_number/tracking", get(track_order))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::ProductListQuery>,
) -> ApiResult {
    let products = services
        .stores
        .catalog
        .list_products(q.filter().storefront(), q.page())
        .await?;
    Ok(Json(products.map(StorefrontProduct::from)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> ApiResult {
    let detail = services.stores.catalog.get_product_by_slug(&slug).await?;
    if !detail.product.is_active() {
        return Err(ApiError::NotFound("product not found"));
    }
    Ok(Json(StorefrontProduct::from(detail)).into_response())
}

/// POST /storefront/checkouts
///
/// Prices the cart with live promotions and stores a pending checkout. The
/// returned id goes into the payment widget's metadata.
pub async fn create_checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewCheckout>,
) -> ApiResult {
    let now = Utc::now();

    if let Some(code) = body.delivery.locker_code() {
        match services.stores.lockers.get_locker(code).await {
            Ok(locker) if locker.active => {}
            Ok(_) => {
                return Err(DomainError::validation(
                    "delivery.locker_code",
                    "locker is not in service",
                )
                .into())
            }
            Err(StoreError::NotFound) => {
                return Err(DomainError::validation("delivery.locker_code", "unknown locker").into())
            }
            Err(e) => return Err(e.into()),
        }
    }

    let ids: Vec<ProductId> = body.items.iter().map(|i| i.product_id).collect();
    let products = services.stores.catalog.products_by_ids(&ids).await?;
    let promotions = services.stores.promotions.live_promotions(now).await?;

    let checkout = Checkout::price(
        body,
        &products,
        &promotions,
        services.rates,
        services.currency,
        now,
    )?;
    services.stores.orders.create_checkout(checkout.clone()).await?;
    info!(
        checkout_id = %checkout.id,
        grand_total = checkout.grand_total.amount_cents,
        "checkout created"
    );
    Ok((StatusCode::CREATED, Json(checkout)).into_response())
}

pub async fn get_checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: CheckoutId = parse_id(&id)?;
    let checkout = services.stores.orders.get_checkout(id).await?;
    Ok(Json(checkout).into_response())
}

/// GET /storefront/orders/:order_number/tracking?email=
///
/// The email must match the order's customer; a mismatch looks exactly like
/// an unknown order number.
pub async fn track_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_number): Path<String>,
    Query(q): Query<dto::TrackingQuery>,
) -> ApiResult {
    let email = q
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::BadRequest("email is required".into()))?;

    let order = match services.stores.orders.get_order_by_number(&order_number).await {
        Ok(order) if order.customer.email_matches(email) => order,
        Ok(_) | Err(StoreError::NotFound) => return Err(ApiError::NotFound("order not found")),
        Err(e) => return Err(e.into()),
    };

    let shipments = services
        .stores
        .orders
        .list_shipments(Some(order.id), Page::new(Some(MAX_PAGE_LIMIT), None))
        .await?
        .items;
    Ok(Json(OrderTracking::new(&order, shipments)).into_response())
}
