//! Admin catalog: attributes, product drafts, publication and products.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use shopfront_catalog::{
    AttributeUpdate, DraftPatch, NewAttribute, NewAttributeValue, NewDraft, ProductDraft,
};
use shopfront_core::{AttributeId, AttributeValueId, DraftId, ExpectedVersion, ProductId};
use shopfront_events::Topic;

use crate::app::dto::{self, parse_id};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn attributes_router() -> Router {
    Router::new()
        .route("/", get(list_attributes).post(create_attribute))
        .route(
            "/:id",
            get(get_attribute).patch(update_attribute).delete(delete_attribute),
        )
        .route("/:id/values", post(add_value))
        .route("/:id/values/:value_id", delete(remove_value))
}

pub fn drafts_router() -> Router {
    Router::new()
        .route("/", get(list_drafts).post(create_draft))
        .route("/:id", get(get_draft).patch(update_draft).delete(delete_draft))
        .route("/:id/publish", post(publish_draft))
}

pub fn products_router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/archive", post(archive_product))
        .route("/:id/unarchive", post(unarchive_product))
}

// Attributes

pub async fn list_attributes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let attributes = services.stores.catalog.list_attributes().await?;
    Ok(Json(attributes).into_response())
}

pub async fn create_attribute(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewAttribute>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let attribute = body.into_attribute(Utc::now())?;
    services.stores.catalog.create_attribute(attribute.clone()).await?;
    Ok((StatusCode::CREATED, Json(attribute)).into_response())
}

pub async fn get_attribute(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let id: AttributeId = parse_id(&id)?;
    let attribute = services.stores.catalog.get_attribute(id).await?;
    Ok(Json(attribute).into_response())
}

pub async fn update_attribute(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AttributeUpdate>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: AttributeId = parse_id(&id)?;
    let attribute = services
        .stores
        .catalog
        .update_attribute(id, body, Utc::now())
        .await?;
    Ok(Json(attribute).into_response())
}

pub async fn delete_attribute(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: AttributeId = parse_id(&id)?;
    services.stores.catalog.delete_attribute(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn add_value(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<NewAttributeValue>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: AttributeId = parse_id(&id)?;
    let (attribute, value_id) = services
        .stores
        .catalog
        .add_attribute_value(id, body, Utc::now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "value_id": value_id, "attribute": attribute })),
    )
        .into_response())
}

pub async fn remove_value(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, value_id)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: AttributeId = parse_id(&id)?;
    let value_id: AttributeValueId = parse_id(&value_id)?;
    let attribute = services
        .stores
        .catalog
        .remove_attribute_value(id, value_id, Utc::now())
        .await?;
    Ok(Json(attribute).into_response())
}

// Drafts

pub async fn list_drafts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::DraftListQuery>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let page = shopfront_core::Page::new(q.limit, q.offset);
    let drafts = services.stores.catalog.list_drafts(q.status, page).await?;
    Ok(Json(drafts).into_response())
}

pub async fn create_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewDraft>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let draft = ProductDraft::create(body, services.currency, Utc::now())?;
    services.stores.catalog.create_draft(draft.clone()).await?;
    Ok((StatusCode::CREATED, Json(draft)).into_response())
}

pub async fn get_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let id: DraftId = parse_id(&id)?;
    let draft = services.stores.catalog.get_draft(id).await?;
    Ok(Json(draft).into_response())
}

pub async fn update_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(patch): Json<DraftPatch>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: DraftId = parse_id(&id)?;
    let draft = services
        .stores
        .catalog
        .update_draft(id, patch, Utc::now())
        .await?;
    Ok(Json(draft).into_response())
}

pub async fn delete_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "catalog.write")?;
    let id: DraftId = parse_id(&id)?;
    services.stores.catalog.delete_draft(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /admin/drafts/:id/publish
///
/// 201 on first publication, 200 when an existing product was updated.
pub async fn publish_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::PublishRequest>>,
) -> ApiResult {
    authz::require(&principal, "catalog.publish")?;
    let id: DraftId = parse_id(&id)?;
    let expected = ExpectedVersion::from_option(body.and_then(|Json(b)| b.expected_version));

    let outcome = services
        .stores
        .catalog
        .publish_draft(id, expected, Utc::now())
        .await?;
    info!(
        draft_id = %id,
        product_id = %outcome.product_id,
        revision = outcome.revision,
        user_id = %principal.user_id(),
        "draft published"
    );
    services.emit(Topic::ProductPublished, outcome.product_id, &outcome);

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome)).into_response())
}

// Products

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::ProductListQuery>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let products = services
        .stores
        .catalog
        .list_products(q.filter(), q.page())
        .await?;
    Ok(Json(products).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, "catalog.read")?;
    let id: ProductId = parse_id(&id)?;
    let product = services.stores.catalog.get_product(id).await?;
    Ok(Json(product).into_response())
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    set_archived(services, principal, id, true).await
}

pub async fn unarchive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    set_archived(services, principal, id, false).await
}

async fn set_archived(
    services: Arc<AppServices>,
    principal: PrincipalContext,
    id: String,
    archived: bool,
) -> ApiResult {
    authz::require(&principal, "catalog.publish")?;
    let id: ProductId = parse_id(&id)?;
    let product = services
        .stores
        .catalog
        .set_product_archived(id, archived, Utc::now())
        .await?;
    info!(product_id = %id, archived, "product visibility changed");
    let topic = if archived { Topic::ProductArchived } else { Topic::ProductPublished };
    services.emit(topic, id, &product);
    Ok(Json(product).into_response())
}
