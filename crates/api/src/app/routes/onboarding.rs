use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::{dto, errors};
use crate::app::services::AgentServices;

pub async fn get_onboarding(
    Extension(services): Extension<Arc<AgentServices>>,
) -> axum::response::Response {
    match services.readiness.load().await {
        Ok(readiness) => Json(dto::OnboardingResponse::from(readiness)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Record consent and/or setup progress from the onboarding UI.
pub async fn put_onboarding(
    Extension(services): Extension<Arc<AgentServices>>,
    Json(body): Json<dto::OnboardingRequest>,
) -> axum::response::Response {
    if let Some(consent) = body.consent {
        if let Err(e) = services.readiness.set_consent(consent).await {
            return errors::store_error_to_response(e);
        }
        tracing::info!(consent = consent.as_str(), "consent updated");
    }
    if let Some(setup) = body.setup {
        if let Err(e) = services.readiness.set_setup(setup).await {
            return errors::store_error_to_response(e);
        }
        tracing::info!(setup = setup.as_str(), "setup state updated");
    }
    StatusCode::NO_CONTENT.into_response()
}
