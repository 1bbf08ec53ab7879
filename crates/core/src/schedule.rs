//! Scheduling port: named periodic and one-shot callbacks.
//!
//! Names are unique per scheduler. Registering a name that is already taken
//! replaces the previous registration.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Future produced by a scheduled callback.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback run on every tick of a periodic job.
pub type PeriodicJob = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Callback run once after a delay.
pub type OneShotJob = Box<dyn FnOnce() -> JobFuture + Send>;

/// Host timer/alarm facility.
pub trait Scheduler: Send + Sync {
    /// Run `job` every `interval` until cancelled.
    fn every(&self, name: &str, interval: Duration, job: PeriodicJob);

    /// Run `job` once after `delay`.
    fn once(&self, name: &str, delay: Duration, job: OneShotJob);

    /// Cancel a job by name. Returns whether anything was registered.
    fn cancel(&self, name: &str) -> bool;
}

enum Registration {
    Periodic { interval: Duration, job: PeriodicJob },
    OneShot { delay: Duration, job: OneShotJob },
}

/// Scheduler that never fires on its own; tests drive it with [`ManualScheduler::fire`].
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<HashMap<String, Registration>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Interval (periodic) or delay (one-shot) of a registered job.
    pub fn period_of(&self, name: &str) -> Option<Duration> {
        self.lock().get(name).map(|r| match r {
            Registration::Periodic { interval, .. } => *interval,
            Registration::OneShot { delay, .. } => *delay,
        })
    }

    /// Run a job now. One-shot jobs are consumed; a one-shot job may re-arm
    /// itself under the same name while it runs.
    pub async fn fire(&self, name: &str) -> bool {
        let future = {
            let mut jobs = self.lock();
            match jobs.remove(name) {
                Some(Registration::Periodic { interval, job }) => {
                    let future = job();
                    jobs.insert(name.to_string(), Registration::Periodic { interval, job });
                    future
                }
                Some(Registration::OneShot { job, .. }) => job(),
                None => return false,
            }
        };
        future.await;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registration>> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, name: &str, interval: Duration, job: PeriodicJob) {
        self.lock()
            .insert(name.to_string(), Registration::Periodic { interval, job });
    }

    fn once(&self, name: &str, delay: Duration, job: OneShotJob) {
        self.lock()
            .insert(name.to_string(), Registration::OneShot { delay, job });
    }

    fn cancel(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }
}

impl core::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let jobs = self.lock();
        let mut names: Vec<_> = jobs.keys().cloned().collect();
        names.sort();
        f.debug_struct("ManualScheduler").field("jobs", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn periodic_jobs_survive_firing_and_one_shots_do_not() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        scheduler.every(
            "tick",
            Duration::from_secs(60),
            Arc::new(move || -> JobFuture {
                let h = h.clone();
                Box::pin(async move {
                    h.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        let h = hits.clone();
        scheduler.once(
            "later",
            Duration::from_secs(5),
            Box::new(move || -> JobFuture {
                Box::pin(async move {
                    h.fetch_add(10, Ordering::SeqCst);
                })
            }),
        );

        assert!(scheduler.fire("tick").await);
        assert!(scheduler.fire("tick").await);
        assert!(scheduler.fire("later").await);
        assert!(!scheduler.fire("later").await);
        assert_eq!(hits.load(Ordering::SeqCst), 12);
        assert!(scheduler.is_registered("tick"));
        assert!(!scheduler.is_registered("later"));
    }

    #[test]
    fn re_registering_replaces_and_cancel_removes() {
        let scheduler = ManualScheduler::new();
        scheduler.once("x", Duration::from_secs(1), Box::new(|| -> JobFuture { Box::pin(async {}) }));
        scheduler.once("x", Duration::from_secs(9), Box::new(|| -> JobFuture { Box::pin(async {}) }));
        assert_eq!(scheduler.period_of("x"), Some(Duration::from_secs(9)));
        assert!(scheduler.cancel("x"));
        assert!(!scheduler.cancel("x"));
    }
}
