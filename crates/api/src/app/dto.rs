use serde::{Deserialize, Serialize};

use sampler_core::{SubmissionId, SurveyResponse, SurveyType};
use sampler_gate::{ConsentState, GateVerdict, Prompt, Readiness, SetupState, SuppressReason};

// -------------------------
// Request DTOs
// -------------------------

/// A host event plus the user's decision on it.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    /// Interstitial element name, e.g. `ssl` or `extension_install_dialog`.
    pub category: String,
    pub outcome: String,
    /// URL of the site involved, if any.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitSurveyRequest {
    pub survey_type: SurveyType,
    pub responses: Vec<SurveyResponse>,
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    #[serde(default)]
    pub consent: Option<ConsentState>,
    #[serde(default)]
    pub setup: Option<SetupState>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub show: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_type: Option<SurveyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
}

impl From<GateVerdict> for EventResponse {
    fn from(verdict: GateVerdict) -> Self {
        Self {
            show: verdict.show,
            reason: verdict.reason,
            survey_type: verdict.prompt.as_ref().map(|p| p.survey_type.clone()),
            prompt: verdict.prompt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitSurveyResponse {
    pub id: SubmissionId,
}

#[derive(Debug, Serialize)]
pub struct OnboardingResponse {
    pub consent: ConsentState,
    pub setup: SetupState,
    pub ready: bool,
}

impl From<Readiness> for OnboardingResponse {
    fn from(readiness: Readiness) -> Self {
        Self {
            consent: readiness.consent,
            setup: readiness.setup,
            ready: readiness.is_ready(),
        }
    }
}
