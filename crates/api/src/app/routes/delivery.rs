use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::errors;
use crate::app::services::AgentServices;

/// Run one delivery cycle now instead of waiting for the next tick.
pub async fn flush(Extension(services): Extension<Arc<AgentServices>>) -> axum::response::Response {
    match services.worker.run_cycle().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::outbox_error_to_response(e),
    }
}
