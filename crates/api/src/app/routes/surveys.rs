use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use sampler_core::{SurveyRecord, SurveyType};
use sampler_gate::SetupState;

use crate::app::{dto, errors};
use crate::app::services::AgentServices;

/// Queue a completed survey for delivery.
///
/// The participant id and `date_taken` are filled in here. Completing the
/// setup survey also marks onboarding setup as done.
pub async fn submit_survey(
    Extension(services): Extension<Arc<AgentServices>>,
    Json(body): Json<dto::SubmitSurveyRequest>,
) -> axum::response::Response {
    let participant_id = match services.participants.get_or_create().await {
        Ok(id) => id,
        Err(e) => return errors::store_error_to_response(e),
    };

    let record = match SurveyRecord::new(
        body.survey_type,
        participant_id,
        services.clock.now(),
        body.responses,
    ) {
        Ok(record) => record,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let is_setup = record.survey_type == SurveyType::Setup;

    let id = match services.outbox.enqueue(record).await {
        Ok(id) => id,
        Err(e) => return errors::outbox_error_to_response(e),
    };

    // Queued either way; a readiness write error does not fail the request.
    if is_setup {
        if let Err(e) = services.readiness.set_setup(SetupState::Completed).await {
            tracing::warn!(submission_id = %id, error = %e, "could not mark setup completed");
        }
    }

    (StatusCode::ACCEPTED, Json(dto::SubmitSurveyResponse { id })).into_response()
}
