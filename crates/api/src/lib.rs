//! HTTP API: storefront, admin back-office and payment webhooks.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
