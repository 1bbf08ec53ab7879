//! Presenter port: the host UI that renders survey prompts.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sampler_core::sanitize::{is_green_lock_site, minimal_url, sanitize_url};
use sampler_core::{EventCategory, SurveyType};

const PROMPT_TITLE: &str = "New survey available";
const PROMPT_BODY: &str = "Click here to take a survey about the screen you just saw";

/// A prompt inviting the user to take a survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub survey_type: SurveyType,
    pub category: EventCategory,
    /// Sanitised host of the site involved, when known.
    pub site: Option<String>,
    /// Short form of the site's URL for the survey page to show.
    pub display_url: Option<String>,
    /// Whether the site is one of the well-known domains that always serve a
    /// valid certificate.
    pub well_known_site: bool,
    pub title: String,
    pub body: String,
    pub shown_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(survey_type: SurveyType, category: EventCategory, shown_at: DateTime<Utc>) -> Self {
        Self {
            survey_type,
            category,
            site: None,
            display_url: None,
            well_known_site: false,
            title: PROMPT_TITLE.to_string(),
            body: PROMPT_BODY.to_string(),
            shown_at,
        }
    }

    /// Attach the (untrusted) URL of the site that triggered the event.
    pub fn with_destination(mut self, url: &str) -> Self {
        self.site = Some(sanitize_url(url)).filter(|s| !s.is_empty());
        self.display_url = Some(minimal_url(url)).filter(|s| !s.is_empty());
        self.well_known_site = is_green_lock_site(url);
        self
    }
}

/// Renders and removes prompts. At most one prompt is live at a time; the
/// gate always calls [`Presenter::clear`] before [`Presenter::show`].
pub trait Presenter: Send + Sync {
    fn show(&self, prompt: &Prompt);

    /// Remove the live prompt, if any.
    fn clear(&self);
}

/// A call observed by [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Show(Prompt),
    Clear,
}

/// Presenter that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
    live: Mutex<Option<Prompt>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// The prompt currently on screen.
    pub fn live(&self) -> Option<Prompt> {
        self.live.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn shown_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PresenterCall::Show(_)))
            .count()
    }
}

impl Presenter for RecordingPresenter {
    fn show(&self, prompt: &Prompt) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(PresenterCall::Show(prompt.clone()));
        *self.live.lock().unwrap_or_else(|p| p.into_inner()) = Some(prompt.clone());
    }

    fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(PresenterCall::Clear);
        *self.live.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn destination_fills_site_fields() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let prompt = Prompt::new(SurveyType::SslOverridableProceed, EventCategory::SslOverridable, at)
            .with_destination("https://mail.google.com/inbox?x=1");
        assert_eq!(prompt.site.as_deref(), Some("mail.google.com"));
        assert_eq!(prompt.display_url.as_deref(), Some("mail.google.com"));
        assert!(prompt.well_known_site);

        let bare = Prompt::new(SurveyType::MalwareProceed, EventCategory::Malware, at)
            .with_destination("javascript://alert(1)");
        assert_eq!(bare.site, None);
        assert!(!bare.well_known_site);
    }
}

