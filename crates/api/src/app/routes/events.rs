use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use sampler_core::{Decision, DecisionOutcome, EventCategory, TriggerEvent};

use crate::app::dto;
use crate::app::services::AgentServices;

/// Run the gate for one host event. Suppression is a normal 200 answer.
pub async fn evaluate_event(
    Extension(services): Extension<Arc<AgentServices>>,
    Json(body): Json<dto::EventRequest>,
) -> Json<dto::EventResponse> {
    let mut event = TriggerEvent::new(EventCategory::from_element_name(&body.category));
    if let Some(url) = body.url {
        event = event.with_destination(url);
    }
    let decision = Decision::new(DecisionOutcome::parse(&body.outcome));

    let verdict = services.gate.evaluate(&event, &decision).await;
    Json(verdict.into())
}

/// The prompt currently on screen, or 204 when none is.
pub async fn current_prompt(
    Extension(services): Extension<Arc<AgentServices>>,
) -> axum::response::Response {
    match services.presenter.live() {
        Some(prompt) => Json(prompt).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
