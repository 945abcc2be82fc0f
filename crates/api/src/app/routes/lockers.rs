use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use shopfront_lockers::{nearest, GeoPoint};

use crate::app::dto::{NearbyOrigin, NearbyQuery};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn storefront_router() -> Router {
    Router::new().route("/nearby", get(nearby))
}

pub fn admin_router() -> Router {
    Router::new().route("/refresh", post(refresh))
}

/// GET /storefront/lockers/nearby?lat&lng|address&limit&max_km
pub async fn nearby(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<NearbyQuery>,
) -> ApiResult {
    let origin = match q.origin()? {
        NearbyOrigin::Coordinates { lat, lng } => GeoPoint::new(lat, lng)
            .ok_or_else(|| ApiError::BadRequest("lat/lng out of range".into()))?,
        NearbyOrigin::Address(address) => {
            let geocoder = services
                .geocoder
                .as_ref()
                .ok_or(ApiError::Unavailable("address search is not configured"))?;
            geocoder
                .geocode(&address)
                .await?
                .ok_or(ApiError::NotFound("address could not be located"))?
        }
    };

    let lockers = services.stores.lockers.list_lockers().await?;
    let matches = nearest(&lockers, origin, q.limit(), q.max_km());
    Ok(Json(json!({ "origin": origin, "lockers": matches })).into_response())
}

/// POST /admin/lockers/refresh
///
/// Pulls the full locker list from the provider and swaps the local copy.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, "lockers.refresh")?;
    let provider = services
        .locker_provider
        .as_ref()
        .ok_or(ApiError::Unavailable("locker provider is not configured"))?;

    let fetched = provider.fetch_lockers(Utc::now()).await?;
    let stored = services.stores.lockers.replace_lockers(fetched).await?;
    info!(lockers = stored, user_id = %principal.user_id(), "locker directory refreshed");
    Ok(Json(json!({ "lockers": stored })).into_response())
}
