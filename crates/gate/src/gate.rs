//! Per-event admission control for survey prompts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use sampler_core::{
    Clock, Decision, DecisionOutcome, EventCategory, JobFuture, Scheduler, SurveyType,
    TriggerEvent,
};

use crate::policy::GatePolicy;
use crate::presenter::{Presenter, Prompt};
use crate::readiness::ReadinessStore;
use crate::throttle::{ThrottleState, ThrottleStore};

/// One-shot job that dismisses the live prompt.
pub const PROMPT_DISMISS_JOB: &str = "prompt-dismiss";

/// Why a prompt was withheld. Suppression is policy, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    UnsupportedCategory,
    /// Inline install the user cancelled.
    InstallCancelled,
    NotReady,
    TooSoon,
    DailyCapReached,
    WeeklyCapReached,
    /// Persisted state could not be read or written.
    StateUnavailable,
}

/// Outcome of [`EventGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateVerdict {
    pub show: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
}

impl GateVerdict {
    fn shown(prompt: Prompt) -> Self {
        Self {
            show: true,
            reason: None,
            prompt: Some(prompt),
        }
    }

    fn suppressed(reason: SuppressReason) -> Self {
        Self {
            show: false,
            reason: Some(reason),
            prompt: None,
        }
    }
}

/// Admission-control policy invoked for every triggering event.
///
/// Checks run in a fixed order and the first failing check suppresses:
/// category, readiness, spacing, daily cap, weekly cap. Any storage problem
/// suppresses as well.
pub struct EventGate {
    policy: GatePolicy,
    throttle: Arc<ThrottleStore>,
    readiness: ReadinessStore,
    presenter: Arc<dyn Presenter>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
}

impl EventGate {
    pub fn new(
        policy: GatePolicy,
        throttle: Arc<ThrottleStore>,
        readiness: ReadinessStore,
        presenter: Arc<dyn Presenter>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            throttle,
            readiness,
            presenter,
            scheduler,
            clock,
        }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub async fn evaluate(&self, event: &TriggerEvent, decision: &Decision) -> GateVerdict {
        let verdict = self.decide(event, decision).await;
        match verdict.reason {
            None => info!(
                category = %event.category,
                outcome = %decision.outcome,
                "survey prompt shown"
            ),
            Some(reason) => debug!(
                category = %event.category,
                outcome = %decision.outcome,
                reason = ?reason,
                "survey prompt suppressed"
            ),
        }
        verdict
    }

    async fn decide(&self, event: &TriggerEvent, decision: &Decision) -> GateVerdict {
        if event.category == EventCategory::InlineInstall
            && decision.outcome == DecisionOutcome::Deny
        {
            return GateVerdict::suppressed(SuppressReason::InstallCancelled);
        }
        if !event.category.is_supported() {
            return GateVerdict::suppressed(SuppressReason::UnsupportedCategory);
        }
        let Some(survey_type) = SurveyType::for_event(&event.category, &decision.outcome) else {
            return GateVerdict::suppressed(SuppressReason::UnsupportedCategory);
        };

        match self.readiness.load().await {
            Ok(r) if r.is_ready() => {}
            Ok(_) => return GateVerdict::suppressed(SuppressReason::NotReady),
            Err(e) => {
                warn!(error = %e, "readiness unreadable; suppressing prompt");
                return GateVerdict::suppressed(SuppressReason::NotReady);
            }
        }

        let now = self.clock.now();
        let admitted = self
            .throttle
            .transact(now, |state| {
                let check = self.check_limits(state, now);
                if check.is_ok() {
                    state.record_prompt(now);
                }
                check
            })
            .await;

        match admitted {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return GateVerdict::suppressed(reason),
            Err(e) => {
                warn!(error = %e, "throttle state unavailable; suppressing prompt");
                return GateVerdict::suppressed(SuppressReason::StateUnavailable);
            }
        }

        let mut prompt = Prompt::new(survey_type, event.category.clone(), now);
        if let Some(url) = event.destination.as_deref() {
            prompt = prompt.with_destination(url);
        }
        self.present(&prompt);
        GateVerdict::shown(prompt)
    }

    fn check_limits(&self, state: &ThrottleState, now: DateTime<Utc>) -> Result<(), SuppressReason> {
        if let Some(last) = state.last_prompt_at {
            // A prompt "in the future" means the clock went backwards; treat as too soon.
            let too_soon = match (now - last).to_std() {
                Ok(elapsed) => elapsed < self.policy.min_spacing,
                Err(_) => true,
            };
            if too_soon {
                return Err(SuppressReason::TooSoon);
            }
        }
        if state.daily_count >= self.policy.max_per_day {
            return Err(SuppressReason::DailyCapReached);
        }
        if let Some(max) = self.policy.max_per_week {
            if state.weekly_count >= max {
                return Err(SuppressReason::WeeklyCapReached);
            }
        }
        Ok(())
    }

    fn present(&self, prompt: &Prompt) {
        self.presenter.clear();
        self.presenter.show(prompt);

        let presenter = self.presenter.clone();
        self.scheduler.once(
            PROMPT_DISMISS_JOB,
            self.policy.prompt_timeout,
            Box::new(move || -> JobFuture {
                Box::pin(async move {
                    presenter.clear();
                })
            }),
        );
    }
}

impl core::fmt::Debug for EventGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
