use axum::{
    routing::{get, post},
    Router,
};

pub mod delivery;
pub mod events;
pub mod onboarding;
pub mod surveys;
pub mod system;

/// Router for all agent endpoints except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/events", post(events::evaluate_event))
        .route("/prompt", get(events::current_prompt))
        .route("/surveys", post(surveys::submit_survey))
        .route("/delivery/flush", post(delivery::flush))
        .route(
            "/onboarding",
            get(onboarding::get_onboarding).put(onboarding::put_onboarding),
        )
}
