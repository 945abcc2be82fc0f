use axum::{routing::get, Router};

pub mod catalog;
pub mod lockers;
pub mod orders;
pub mod promotions;
pub mod storefront;
pub mod system;
pub mod webhooks;

/// Public shop endpoints, mounted under `/storefront`.
pub fn storefront_router() -> Router {
    Router::new()
        .nest("/products", storefront::products_router())
        .nest("/checkouts", storefront::checkouts_router())
        .nest("/orders", storefront::orders_router())
        .nest("/promotions", promotions::storefront_router())
        .nest("/lockers", lockers::storefront_router())
}

/// Authenticated back-office endpoints, mounted under `/admin`.
pub fn admin_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/attributes", catalog::attributes_router())
        .nest("/drafts", catalog::drafts_router())
        .nest("/products", catalog::products_router())
        .nest("/promotions", promotions::admin_router())
        .nest("/orders", orders::orders_router())
        .nest("/supplier-orders", orders::supplier_orders_router())
        .nest("/shipments", orders::shipments_router())
        .nest("/lockers", lockers::admin_router())
}
