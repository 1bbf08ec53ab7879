use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use sampler_core::{DomainError, StoreError};
use sampler_delivery::OutboxError;

pub fn outbox_error_to_response(err: OutboxError) -> axum::response::Response {
    match err {
        OutboxError::Invalid(e) => domain_error_to_response(e),
        OutboxError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::warn!(error = %err, "storage unavailable");
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "store_unavailable",
        err.to_string(),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
