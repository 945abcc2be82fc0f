use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use shopfront_auth::AuthzError;
use shopfront_core::{DomainError, ValidationErrors};
use shopfront_infra::StoreError;
use shopfront_lockers::{GeocodeError, ProviderError};

/// Everything a handler can fail with, mapped to one JSON error shape.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Forbidden(AuthzError),
    BadRequest(String),
    NotFound(&'static str),
    /// A feature whose configuration is missing.
    Unavailable(&'static str),
    /// An upstream HTTP dependency failed.
    Upstream(String),
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Store(StoreError::from(err))
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err)
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured => ApiError::Unavailable("locker provider is not configured"),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Store(e) => store_error_to_response(e),
            ApiError::Forbidden(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", what),
            ApiError::Unavailable(msg) => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg)
            }
            ApiError::Upstream(msg) => json_error(StatusCode::BAD_GATEWAY, "upstream_error", msg),
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Database(msg) => {
            error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(fields) => validation_error(fields),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
    }
}

/// 400 with the offending fields listed.
pub fn validation_error(fields: ValidationErrors) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": fields.to_string(),
            "fields": fields,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let status = |e: ApiError| e.into_response().status();
        assert_eq!(status(StoreError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(status(StoreError::Conflict("slug".into()).into()), StatusCode::CONFLICT);
        assert_eq!(
            status(DomainError::validation("title", "required").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(DomainError::invariant("already archived").into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(StoreError::Database("boom".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ProviderError::Status(500).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(AuthzError::Forbidden("orders.read".into()).into()),
            StatusCode::FORBIDDEN
        );
    }
}
