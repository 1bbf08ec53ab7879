//! `sampler-delivery`: durable outbox and background delivery of survey records.
//!
//! Completed surveys are written to the outbox first and delivered later by a
//! periodic worker, so a record survives restarts and collector outages.
//!
//! ## Components
//!
//! - `RetryPolicy`: attempt count to backoff delay
//! - `OutboxStore`: persistence port (in-memory here, SQLite in `sampler-infra`)
//! - `Outbox`: enqueue / due scan / delivered / failed bookkeeping
//! - `RemoteTransport`: one delivery attempt to the collector
//! - `DeliveryWorker`: runs delivery cycles on a schedule

pub mod outbox;
pub mod retry;
pub mod store;
pub mod transport;
pub mod worker;

pub use outbox::{Outbox, OutboxError};
pub use retry::RetryPolicy;
pub use store::{InMemoryOutboxStore, OutboxStore, PendingSubmission};
pub use transport::{DeliveryOutcome, RemoteTransport, ScriptedTransport};
pub use worker::{CycleReport, DeliveryWorker, DeliveryWorkerConfig, DELIVERY_CYCLE_JOB};
