//! Periodic delivery of due outbox rows.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sampler_core::{JobFuture, Scheduler, SubmissionId, SurveyRecord};

use crate::outbox::{Outbox, OutboxError};
use crate::transport::{DeliveryOutcome, RemoteTransport};

/// Name of the periodic job registered by [`DeliveryWorker::install`].
pub const DELIVERY_CYCLE_JOB: &str = "delivery-cycle";

/// Delivery worker configuration.
#[derive(Debug, Clone)]
pub struct DeliveryWorkerConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// Upper bound on a single send.
    pub send_timeout: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for DeliveryWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            send_timeout: Duration::from_millis(4_000),
            name: "delivery-worker".to_string(),
        }
    }
}

impl DeliveryWorkerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Rows due when the cycle started.
    pub due: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Due rows left alone because an earlier cycle is still sending them.
    pub skipped: usize,
    /// Attempts whose outcome could not be written back.
    pub store_errors: usize,
}

enum AttemptResult {
    Delivered,
    Failed,
    StoreError,
}

/// Drains due outbox rows through a [`RemoteTransport`].
///
/// Each cycle takes one snapshot of due rows and makes exactly one attempt
/// per row, all attempts running concurrently. A row still being sent by an
/// earlier cycle is skipped, so a row never has two attempts in flight.
pub struct DeliveryWorker {
    outbox: Arc<Outbox>,
    transport: Arc<dyn RemoteTransport>,
    config: DeliveryWorkerConfig,
    in_flight: Arc<Mutex<HashSet<SubmissionId>>>,
}

impl DeliveryWorker {
    pub fn new(
        outbox: Arc<Outbox>,
        transport: Arc<dyn RemoteTransport>,
        config: DeliveryWorkerConfig,
    ) -> Self {
        Self {
            outbox,
            transport,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &DeliveryWorkerConfig {
        &self.config
    }

    /// Register the periodic cycle with `scheduler`.
    pub fn install(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        let worker = Arc::clone(self);
        scheduler.every(
            DELIVERY_CYCLE_JOB,
            self.config.interval,
            Arc::new(move || -> JobFuture {
                let worker = worker.clone();
                Box::pin(async move {
                    if let Err(e) = worker.run_cycle().await {
                        debug!(worker = %worker.config.name, error = %e, "scheduled cycle skipped");
                    }
                })
            }),
        );
        info!(
            worker = %self.config.name,
            interval_secs = self.config.interval.as_secs(),
            "delivery cycle scheduled"
        );
    }

    /// Run one delivery cycle now.
    ///
    /// A store failure while scanning skips the whole cycle; nothing is sent
    /// and no row changes.
    pub async fn run_cycle(&self) -> Result<CycleReport, OutboxError> {
        let now = self.outbox.now();
        let due = match self.outbox.due_items(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(worker = %self.config.name, error = %e, "outbox unavailable; skipping cycle");
                return Err(e);
            }
        };

        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };
        if due.is_empty() {
            debug!(worker = %self.config.name, "nothing due");
            return Ok(report);
        }

        let mut attempts = JoinSet::new();
        for (id, record) in due {
            let Some(guard) = InFlight::claim(&self.in_flight, id) else {
                debug!(submission_id = %id, "still in flight; skipping");
                report.skipped += 1;
                continue;
            };
            attempts.spawn(attempt(
                guard,
                record,
                self.outbox.clone(),
                self.transport.clone(),
                self.config.send_timeout,
            ));
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(AttemptResult::Delivered) => report.delivered += 1,
                Ok(AttemptResult::Failed) => report.failed += 1,
                Ok(AttemptResult::StoreError) => report.store_errors += 1,
                Err(e) => {
                    error!(worker = %self.config.name, error = %e, "delivery attempt panicked");
                    report.store_errors += 1;
                }
            }
        }

        info!(
            worker = %self.config.name,
            due = report.due,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "delivery cycle finished"
        );
        Ok(report)
    }
}

impl core::fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One attempt for one row. The row id travels inside the guard.
async fn attempt(
    guard: InFlight,
    record: SurveyRecord,
    outbox: Arc<Outbox>,
    transport: Arc<dyn RemoteTransport>,
    send_timeout: Duration,
) -> AttemptResult {
    let id = guard.id;
    let outcome = match tokio::time::timeout(send_timeout, transport.send(&record)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(submission_id = %id, "delivery timed out");
            DeliveryOutcome::Failure { status: None }
        }
    };

    let written = match outcome {
        DeliveryOutcome::Success => outbox.mark_delivered(id).await.map(|_| AttemptResult::Delivered),
        DeliveryOutcome::Failure { status } => {
            debug!(submission_id = %id, status = ?status, "collector rejected delivery");
            outbox.mark_failed(id).await.map(|_| AttemptResult::Failed)
        }
    };

    match written {
        Ok(result) => result,
        Err(e) => {
            warn!(submission_id = %id, error = %e, "could not record delivery outcome");
            AttemptResult::StoreError
        }
    }
}

/// Marks a row as being sent; released on drop, even if the attempt panics.
struct InFlight {
    id: SubmissionId,
    set: Arc<Mutex<HashSet<SubmissionId>>>,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<SubmissionId>>>, id: SubmissionId) -> Option<Self> {
        let inserted = set.lock().unwrap_or_else(|p| p.into_inner()).insert(id);
        inserted.then(|| Self {
            id,
            set: set.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::store::{InMemoryOutboxStore, OutboxStore};
    use crate::transport::ScriptedTransport;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use sampler_core::{Clock, ManualClock, ManualScheduler, StoreError, SurveyResponse, SurveyType};
    use tokio::sync::Notify;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn record() -> SurveyRecord {
        SurveyRecord::new(
            SurveyType::Setup,
            "P1".parse().unwrap(),
            start(),
            vec![SurveyResponse::new("How satisfied are you?", "Very")],
        )
        .unwrap()
    }

    struct Fixture {
        outbox: Arc<Outbox>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let outbox = Arc::new(Outbox::new(
            InMemoryOutboxStore::arc(),
            clock.clone(),
            RetryPolicy::default(),
        ));
        Fixture { outbox, clock }
    }

    fn worker(outbox: &Arc<Outbox>, transport: Arc<dyn RemoteTransport>) -> Arc<DeliveryWorker> {
        Arc::new(DeliveryWorker::new(
            outbox.clone(),
            transport,
            DeliveryWorkerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn failure_then_success_end_to_end() {
        let f = fixture();
        let transport = Arc::new(ScriptedTransport::new([
            DeliveryOutcome::Failure { status: Some(500) },
            DeliveryOutcome::Success,
        ]));
        let worker = worker(&f.outbox, transport.clone());

        let id = f.outbox.enqueue(record()).await.unwrap();

        let first = worker.run_cycle().await.unwrap();
        assert_eq!(first.failed, 1);
        let row = f.outbox.get(id).await.unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.next_attempt_at, start() + ChronoDuration::milliseconds(60_000));

        // Not due yet: no attempt.
        let idle = worker.run_cycle().await.unwrap();
        assert_eq!(idle, CycleReport::default());
        assert_eq!(transport.send_count(), 1);

        f.clock.advance(ChronoDuration::seconds(61));
        let second = worker.run_cycle().await.unwrap();
        assert_eq!(second.delivered, 1);
        assert!(f.outbox.get(id).await.unwrap().is_none());
        assert!(f.outbox.due_items(f.clock.now()).await.unwrap().is_empty());
        assert_eq!(transport.sent(), vec![record(), record()]);
    }

    #[tokio::test]
    async fn perpetual_failure_keeps_backing_off() {
        let f = fixture();
        let transport = Arc::new(ScriptedTransport::always(DeliveryOutcome::Failure {
            status: Some(503),
        }));
        let worker = worker(&f.outbox, transport.clone());
        let id = f.outbox.enqueue(record()).await.unwrap();

        let mut last = f.outbox.get(id).await.unwrap().unwrap();
        for cycle in 1..=6u32 {
            f.clock.set(last.next_attempt_at);
            let report = worker.run_cycle().await.unwrap();
            assert_eq!(report.failed, 1);

            let row = f.outbox.get(id).await.unwrap().unwrap();
            assert_eq!(row.attempts, last.attempts + 1);
            assert!(row.next_attempt_at > last.next_attempt_at);
            assert_eq!(transport.send_count(), cycle as usize);
            last = row;
        }
    }

    #[tokio::test]
    async fn slow_collector_counts_as_failure() {
        let f = fixture();
        let transport = Arc::new(
            ScriptedTransport::always(DeliveryOutcome::Success)
                .with_latency(std::time::Duration::from_secs(5)),
        );
        let worker = Arc::new(DeliveryWorker::new(
            f.outbox.clone(),
            transport,
            DeliveryWorkerConfig::default().with_send_timeout(std::time::Duration::from_millis(20)),
        ));
        let id = f.outbox.enqueue(record()).await.unwrap();

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(f.outbox.get(id).await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn mixed_outcomes_in_one_cycle() {
        let f = fixture();
        let transport = Arc::new(ScriptedTransport::new([
            DeliveryOutcome::Success,
            DeliveryOutcome::Failure { status: None },
            DeliveryOutcome::Success,
        ]));
        let worker = worker(&f.outbox, transport);
        for _ in 0..3 {
            f.outbox.enqueue(record()).await.unwrap();
        }

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.due, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(f.outbox.pending_count().await.unwrap(), 1);
    }

    /// Transport that blocks until released.
    #[derive(Default)]
    struct GatedTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteTransport for GatedTransport {
        async fn send(&self, _record: &SurveyRecord) -> DeliveryOutcome {
            self.entered.notify_one();
            self.release.notified().await;
            DeliveryOutcome::Success
        }
    }

    #[tokio::test]
    async fn overlapping_cycles_never_double_send() {
        let f = fixture();
        let transport = Arc::new(GatedTransport::default());
        let worker = worker(&f.outbox, transport.clone());
        f.outbox.enqueue(record()).await.unwrap();

        let background = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run_cycle().await })
        };
        transport.entered.notified().await;

        let overlapping = worker.run_cycle().await.unwrap();
        assert_eq!(overlapping.skipped, 1);

        transport.release.notify_one();
        let first = background.await.unwrap().unwrap();
        assert_eq!(first.delivered, 1);
        assert_eq!(f.outbox.pending_count().await.unwrap(), 0);
    }

    /// Store whose scans always fail.
    struct DownStore;

    #[async_trait]
    impl OutboxStore for DownStore {
        async fn insert(
            &self,
            _record: &SurveyRecord,
            _next_attempt_at: DateTime<Utc>,
        ) -> Result<SubmissionId, StoreError> {
            Err(StoreError::unavailable("down"))
        }

        async fn scan_due(
            &self,
            _now: DateTime<Utc>,
        ) -> Result<Vec<crate::store::PendingSubmission>, StoreError> {
            Err(StoreError::unavailable("down"))
        }

        async fn get(
            &self,
            _id: SubmissionId,
        ) -> Result<Option<crate::store::PendingSubmission>, StoreError> {
            Err(StoreError::unavailable("down"))
        }

        async fn reschedule(
            &self,
            _id: SubmissionId,
            _attempts: u32,
            _next_attempt_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("down"))
        }

        async fn delete(&self, _id: SubmissionId) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("down"))
        }

        async fn count(&self) -> Result<usize, StoreError> {
            Err(StoreError::unavailable("down"))
        }
    }

    #[tokio::test]
    async fn unavailable_store_skips_cycle_without_sending() {
        let outbox = Arc::new(Outbox::new(
            Arc::new(DownStore),
            Arc::new(ManualClock::new(start())),
            RetryPolicy::default(),
        ));
        let transport = Arc::new(ScriptedTransport::always(DeliveryOutcome::Success));
        let worker = worker(&outbox, transport.clone());

        assert!(matches!(worker.run_cycle().await, Err(OutboxError::Store(_))));
        assert_eq!(transport.send_count(), 0);
    }

    #[tokio::test]
    async fn install_registers_periodic_cycle() {
        let f = fixture();
        let transport = Arc::new(ScriptedTransport::always(DeliveryOutcome::Success));
        let worker = worker(&f.outbox, transport.clone());
        let scheduler = ManualScheduler::arc();

        worker.install(scheduler.as_ref());
        assert_eq!(
            scheduler.period_of(DELIVERY_CYCLE_JOB),
            Some(std::time::Duration::from_secs(600))
        );

        f.outbox.enqueue(record()).await.unwrap();
        assert!(scheduler.fire(DELIVERY_CYCLE_JOB).await);
        assert_eq!(transport.send_count(), 1);
        assert!(scheduler.is_registered(DELIVERY_CYCLE_JOB));
    }
}
