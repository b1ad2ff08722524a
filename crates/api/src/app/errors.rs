use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use consignment_auth::AuthzError;
use consignment_core::DomainError;
use consignment_engine::EngineError;

pub type ApiResult<T> = Result<T, Response>;

pub fn engine_error_to_response(err: EngineError) -> Response {
    match err {
        EngineError::Domain(e) => domain_error_to_response(e),
        EngineError::Concurrency(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "concurrency_conflict", msg)
        }
        EngineError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        EngineError::Corrupt(msg) => {
            tracing::error!(message = %msg, "read model or event log is inconsistent");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
        EngineError::Store(e) if e.is_transient() => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        }
        EngineError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::InvalidState(_)
        | DomainError::InvalidTransition { .. }
        | DomainError::Conflict(_)
        | DomainError::DuplicateKey(_)
        | DomainError::OverlappingPeriod(_) => StatusCode::CONFLICT,
        DomainError::InsufficientStock { .. } | DomainError::NoSalesInPeriod => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
