//! `sampler-core`: domain foundation for the experience-sampling agent.
//!
//! This crate contains the survey/event model and the **ports** the rest of
//! the workspace talks through (clock, key/value storage, scheduling). It has
//! no infrastructure concerns; adapters live in `sampler-infra`.

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod kv;
pub mod sanitize;
pub mod schedule;
pub mod survey;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult, StoreError};
pub use event::{Decision, DecisionOutcome, EventCategory, TriggerEvent};
pub use id::{ParticipantId, SubmissionId};
pub use kv::{InMemoryKvStore, KvStore};
pub use schedule::{JobFuture, ManualScheduler, OneShotJob, PeriodicJob, Scheduler};
pub use survey::{SurveyRecord, SurveyResponse, SurveyType};
