use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use shopfront_core::{DomainError, ProductId, PromotionId, ValidationErrors};
use shopfront_promotions::{evaluate, CartLine, NewPromotion, PromotionCart, PromotionUpdate};

use crate::app::dto::{self, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

const MAX_LINE_QUANTITY: u32 = 99;

pub fn admin_router() -> Router {
    Router::new()
        .route("/", get(list_promotions).post(create_promotion))
        .route(
            "/:id",
            get(get_promotion).patch(update_promotion).delete(delete_promotion),
        )
}

pub fn storefront_router() -> Router {
    Router::new().route("/evaluate", post(evaluate_cart))
}

pub async fn list_promotions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, "promotions.read")?;
    let promotions = services.stores.promotions.list_promotions().await?;
    Ok(Json(promotions).into_response())
}

pub async fn create_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPromotion>,
) -> ApiResult {
    authz::require(&principal, "promotions.write")?;
    let promotion = body.into_promotion(Utc::now())?;
    services
        .stores
        .promotions
        .create_promotion(promotion.clone())
        .await?;
    Ok((StatusCode::CREATED, Json(promotion)).into_response())
}

pub async fn get_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "promotions.read")?;
    let id: PromotionId = parse_id(&id)?;
    let promotion = services.stores.promotions.get_promotion(id).await?;
    Ok(Json(promotion).into_response())
}

pub async fn update_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PromotionUpdate>,
) -> ApiResult {
    authz::require(&principal, "promotions.write")?;
    let id: PromotionId = parse_id(&id)?;
    let promotion = services
        .stores
        .promotions
        .update_promotion(id, body, Utc::now())
        .await?;
    Ok(Json(promotion).into_response())
}

pub async fn delete_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "promotions.write")?;
    let id: PromotionId = parse_id(&id)?;
    services.stores.promotions.delete_promotion(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /storefront/promotions/evaluate
///
/// Prices the cart server-side and reports which live promotions apply.
/// Nothing is reserved or recorded.
pub async fn evaluate_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EvaluatePromotionsRequest>,
) -> ApiResult {
    let now = Utc::now();
    let ids: Vec<ProductId> = body.items.iter().map(|i| i.product_id).collect();
    let products = services.stores.catalog.products_by_ids(&ids).await?;

    let mut errs = ValidationErrors::new();
    let mut lines = Vec::with_capacity(body.items.len());
    for (i, item) in body.items.iter().enumerate() {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            errs.push(
                format!("items[{i}].quantity"),
                format!("must be between 1 and {MAX_LINE_QUANTITY}"),
            );
            continue;
        }
        let Some(detail) = products.iter().find(|d| d.product.id == item.product_id) else {
            errs.push(format!("items[{i}].product_id"), "unknown product");
            continue;
        };
        match detail.price_for(item.variant_id) {
            Ok(priced) if priced.unit_price.currency == services.currency => {
                lines.push(CartLine {
                    product_id: priced.product_id,
                    quantity: item.quantity,
                    unit_price: priced.unit_price,
                });
            }
            Ok(_) => errs.push(format!("items[{i}].product_id"), "priced in another currency"),
            Err(DomainError::Validation(e)) => {
                for fe in e.errors() {
                    errs.push(format!("items[{i}].{}", fe.field), fe.message.clone());
                }
            }
            Err(other) => return Err(other.into()),
        }
    }
    errs.check(!body.items.is_empty(), "items", "cart is empty");
    errs.into_result()?;

    let promotions = services.stores.promotions.live_promotions(now).await?;
    let cart = PromotionCart { currency: services.currency, lines };
    let code = body.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let outcome = evaluate(&promotions, &cart, code, now)?;
    Ok(Json(outcome).into_response())
}
