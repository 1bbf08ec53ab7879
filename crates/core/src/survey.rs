//! Completed survey records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::event::{DecisionOutcome, EventCategory};
use crate::id::ParticipantId;

/// Which questionnaire a record answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SurveyType {
    /// One-time onboarding questionnaire.
    Setup,
    SslOverridableProceed,
    SslOverridableNoProceed,
    SslNonOverridable,
    MalwareProceed,
    MalwareNoProceed,
    PhishingProceed,
    PhishingNoProceed,
    ExtensionProceed,
    ExtensionNoProceed,
    Other(String),
}

impl SurveyType {
    /// Pick the survey to offer for an event, or `None` when the category has
    /// no survey.
    pub fn for_event(category: &EventCategory, outcome: &DecisionOutcome) -> Option<Self> {
        let proceeded = matches!(outcome, DecisionOutcome::Proceed);
        let survey = match category {
            EventCategory::SslOverridable if proceeded => Self::SslOverridableProceed,
            EventCategory::SslOverridable => Self::SslOverridableNoProceed,
            EventCategory::SslNonOverridable => Self::SslNonOverridable,
            EventCategory::Malware if proceeded => Self::MalwareProceed,
            EventCategory::Malware => Self::MalwareNoProceed,
            EventCategory::Phishing if proceeded => Self::PhishingProceed,
            EventCategory::Phishing => Self::PhishingNoProceed,
            EventCategory::ExtensionInstall | EventCategory::InlineInstall if proceeded => {
                Self::ExtensionProceed
            }
            EventCategory::ExtensionInstall | EventCategory::InlineInstall => {
                Self::ExtensionNoProceed
            }
            EventCategory::Harmful
            | EventCategory::BundleInstall
            | EventCategory::RemoteInstall
            | EventCategory::Unknown(_) => return None,
        };
        Some(survey)
    }

    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "setup" => Self::Setup,
            "ssl-overridable-proceed" => Self::SslOverridableProceed,
            "ssl-overridable-noproceed" => Self::SslOverridableNoProceed,
            "ssl-nonoverridable" => Self::SslNonOverridable,
            "malware-proceed" => Self::MalwareProceed,
            "malware-noproceed" => Self::MalwareNoProceed,
            "phishing-proceed" => Self::PhishingProceed,
            "phishing-noproceed" => Self::PhishingNoProceed,
            "extension-proceed" => Self::ExtensionProceed,
            "extension-noproceed" => Self::ExtensionNoProceed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Setup => "setup",
            Self::SslOverridableProceed => "ssl-overridable-proceed",
            Self::SslOverridableNoProceed => "ssl-overridable-noproceed",
            Self::SslNonOverridable => "ssl-nonoverridable",
            Self::MalwareProceed => "malware-proceed",
            Self::MalwareNoProceed => "malware-noproceed",
            Self::PhishingProceed => "phishing-proceed",
            Self::PhishingNoProceed => "phishing-noproceed",
            Self::ExtensionProceed => "extension-proceed",
            Self::ExtensionNoProceed => "extension-noproceed",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for SurveyType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SurveyType> for String {
    fn from(value: SurveyType) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for SurveyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question and the participant's answer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub question: String,
    pub answer: String,
}

impl SurveyResponse {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A completed survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub survey_type: SurveyType,
    pub participant_id: ParticipantId,
    pub date_taken: DateTime<Utc>,
    /// Answers in the order the questions were asked.
    pub responses: Vec<SurveyResponse>,
}

impl SurveyRecord {
    /// Build a record, rejecting one without any responses.
    pub fn new(
        survey_type: SurveyType,
        participant_id: ParticipantId,
        date_taken: DateTime<Utc>,
        responses: Vec<SurveyResponse>,
    ) -> DomainResult<Self> {
        let record = Self {
            survey_type,
            participant_id,
            date_taken,
            responses,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.responses.is_empty() {
            return Err(DomainError::validation("survey record has no responses"));
        }
        Ok(())
    }
}
