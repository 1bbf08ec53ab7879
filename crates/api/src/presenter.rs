//! Presenter used by the agent binary.

use std::sync::Mutex;

use tracing::info;

use sampler_gate::{Presenter, Prompt};

/// Logs prompts and keeps the live one so the host UI can poll for it.
#[derive(Debug, Default)]
pub struct TracingPresenter {
    live: Mutex<Option<Prompt>>,
}

impl TracingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> Option<Prompt> {
        self.live.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Presenter for TracingPresenter {
    fn show(&self, prompt: &Prompt) {
        info!(
            survey_type = %prompt.survey_type,
            category = %prompt.category,
            site = prompt.site.as_deref().unwrap_or(""),
            "showing survey prompt"
        );
        *self.live.lock().unwrap_or_else(|p| p.into_inner()) = Some(prompt.clone());
    }

    fn clear(&self) {
        if self
            .live
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .is_some()
        {
            info!("survey prompt dismissed");
        }
    }
}
