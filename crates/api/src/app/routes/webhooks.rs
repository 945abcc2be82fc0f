//! YoCo payment webhooks.
//!
//! The signature is checked against the raw body before anything is
//! parsed. Handling is idempotent: YoCo retries until it sees a 2xx, and a
//! replayed `payment.succeeded` returns the order it already created.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use shopfront_events::Topic;
use shopfront_payments::{
    PaymentEvent, WebhookError, WebhookEvent, WebhookHeaders, HEADER_ID, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};

use crate::app::errors::{json_error, ApiError, ApiResult};
use crate::app::routes::orders::emit_order_change;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/yoco", post(yoco))
}

fn header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn bad_payload(err: WebhookError) -> ApiError {
    ApiError::BadRequest(err.to_string())
}

/// POST /webhooks/yoco
pub async fn yoco(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let verifier = services
        .webhooks
        .as_ref()
        .ok_or(ApiError::Unavailable("payment webhooks are not configured"))?;

    let signed = WebhookHeaders {
        id: header(&headers, HEADER_ID),
        timestamp: header(&headers, HEADER_TIMESTAMP),
        signature: header(&headers, HEADER_SIGNATURE),
    };
    if let Err(e) = verifier.verify(&signed, &body, Utc::now()) {
        warn!(webhook_id = ?signed.id, error = %e, "rejected webhook");
        return Ok(json_error(StatusCode::UNAUTHORIZED, "invalid_signature", e.to_string()));
    }

    let event = WebhookEvent::parse(&body).map_err(bad_payload)?;
    let now = Utc::now();
    match event.classify().map_err(bad_payload)? {
        PaymentEvent::Succeeded { checkout_id, confirmation } => {
            let payment_id = confirmation.payment_id.clone();
            let placed = services
                .stores
                .orders
                .create_order_from_payment(checkout_id, confirmation, now)
                .await?;
            let order = &placed.order;
            if placed.created {
                info!(
                    webhook_id = %event.id,
                    checkout_id = %checkout_id,
                    order_id = %order.id,
                    order_number = %order.order_number,
                    "order created from payment"
                );
                services.emit(Topic::OrderCreated, order.id, order);
            } else {
                info!(webhook_id = %event.id, payment_id = %payment_id, "duplicate payment webhook");
            }
            Ok(Json(json!({
                "received": true,
                "order_number": order.order_number,
                "created": placed.created,
            }))
            .into_response())
        }
        PaymentEvent::Failed { checkout_id, payment_id } => {
            let marked = services
                .stores
                .orders
                .mark_checkout_failed(checkout_id, &payment_id, now)
                .await?;
            info!(checkout_id = %checkout_id, payment_id = %payment_id, marked, "payment failed");
            Ok(Json(json!({ "received": true })).into_response())
        }
        PaymentEvent::Refunded { payment_id, amount_cents } => {
            let change = services
                .stores
                .orders
                .refund_order_by_payment(&payment_id, now)
                .await?;
            match &change {
                Some(change) => emit_order_change(&services, change),
                None => info!(payment_id = %payment_id, "refund for an already refunded order"),
            }
            debug!(payment_id = %payment_id, amount_cents, "refund handled");
            Ok(Json(json!({ "received": true })).into_response())
        }
        PaymentEvent::Ignored { event_type } => {
            debug!(webhook_id = %event.id, event_type = %event_type, "webhook ignored");
            Ok(Json(json!({ "received": true, "ignored": event_type })).into_response())
        }
    }
}
