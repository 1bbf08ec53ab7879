//! `sampler-gate`: admission control for survey prompts.
//!
//! Decides, per triggering event, whether a prompt may be shown, bounding
//! prompt frequency with a minimum spacing plus daily and weekly caps.
//!
//! ## Components
//!
//! - `ThrottleState` / `ThrottleStore`: persisted counters and last-prompt time
//! - `Readiness`: onboarding flags (consent granted, setup completed)
//! - `EventGate`: the per-event policy
//! - `ResetJobs`: counter resets at local day and week boundaries
//! - `ParticipantRegistry`: the install-stable participant id

pub mod gate;
pub mod participant;
pub mod policy;
pub mod presenter;
pub mod readiness;
pub mod reset;
pub mod throttle;

pub use gate::{EventGate, GateVerdict, SuppressReason, PROMPT_DISMISS_JOB};
pub use participant::ParticipantRegistry;
pub use policy::GatePolicy;
pub use presenter::{Presenter, PresenterCall, Prompt, RecordingPresenter};
pub use readiness::{ConsentState, Readiness, ReadinessStore, SetupState};
pub use reset::{ResetJobs, ResetWindow, DAILY_RESET_JOB, WEEKLY_RESET_JOB};
pub use throttle::{ThrottleState, ThrottleStore};
