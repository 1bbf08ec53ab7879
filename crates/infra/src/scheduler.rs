//! Tokio-backed implementation of the scheduling port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use sampler_core::{OneShotJob, PeriodicJob, Scheduler};

struct Registered {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    next_generation: u64,
    by_name: HashMap<String, Registered>,
}

/// Runs every named job as its own tokio task.
///
/// Periodic jobs first fire one interval after registration; each callback
/// is awaited before the next tick, and missed ticks are skipped rather
/// than replayed. Registering a taken name aborts the previous task.
///
/// Must be used from within a tokio runtime.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    jobs: Arc<Mutex<Jobs>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().by_name.contains_key(name)
    }

    /// Abort every job.
    pub fn shutdown(&self) {
        let mut jobs = self.lock();
        for (name, registered) in jobs.by_name.drain() {
            debug!(job = %name, "aborting scheduled job");
            registered.handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn register<F, Fut>(&self, name: &str, spawn: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        // Spawn under the lock so a fast task cannot look itself up before
        // it has been recorded.
        let mut jobs = self.lock();
        let generation = jobs.next_generation;
        jobs.next_generation += 1;

        let handle = tokio::spawn(spawn(generation));
        if let Some(previous) = jobs.by_name.insert(
            name.to_string(),
            Registered { generation, handle },
        ) {
            debug!(job = %name, "replacing scheduled job");
            previous.handle.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, name: &str, interval: Duration, job: PeriodicJob) {
        self.register(name, |_| async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                job().await;
            }
        });
    }

    fn once(&self, name: &str, delay: Duration, job: OneShotJob) {
        let jobs = self.jobs.clone();
        let owned_name = name.to_string();
        self.register(name, move |generation| async move {
            tokio::time::sleep(delay).await;
            {
                // Deregister before running so the job may re-arm itself
                // under the same name.
                let mut jobs = jobs.lock().unwrap_or_else(|p| p.into_inner());
                if jobs
                    .by_name
                    .get(&owned_name)
                    .is_some_and(|r| r.generation == generation)
                {
                    jobs.by_name.remove(&owned_name);
                }
            }
            job().await;
        });
    }

    fn cancel(&self, name: &str) -> bool {
        match self.lock().by_name.remove(name) {
            Some(registered) => {
                registered.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl core::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let jobs = self.lock();
        f.debug_struct("TokioScheduler")
            .field("jobs", &jobs.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sampler_core::JobFuture;

    use super::*;

    fn counter_job(counter: &Arc<AtomicUsize>) -> PeriodicJob {
        let counter = counter.clone();
        Arc::new(move || -> JobFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_job_fires_every_interval() {
        let scheduler = TokioScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.every("tick", Duration::from_secs(60), counter_job(&count));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_registered("tick"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callbacks_never_overlap() {
        let scheduler = TokioScheduler::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let job: PeriodicJob = {
            let (running, max_seen, runs) = (running.clone(), max_seen.clone(), runs.clone());
            Arc::new(move || -> JobFuture {
                let (running, max_seen, runs) = (running.clone(), max_seen.clone(), runs.clone());
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(25)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                })
            })
        };
        scheduler.every("slow", Duration::from_secs(10), job);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registering_replaces_and_cancel_stops() {
        let scheduler = TokioScheduler::new();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));

        scheduler.every("job", Duration::from_secs(10), counter_job(&old));
        scheduler.every("job", Duration::from_secs(10), counter_job(&new));
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 3);

        assert!(scheduler.cancel("job"));
        assert!(!scheduler.cancel("job"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(new.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_runs_once_and_deregisters() {
        let scheduler = TokioScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let job: OneShotJob = {
            let count = count.clone();
            Box::new(move || -> JobFuture {
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
        };
        scheduler.once("dismiss", Duration::from_secs(15), job);
        assert!(scheduler.is_registered("dismiss"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_registered("dismiss"));
    }

    fn rearming_job(scheduler: TokioScheduler, count: Arc<AtomicUsize>) -> OneShotJob {
        Box::new(move || -> JobFuture {
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                let next = rearming_job(scheduler.clone(), count.clone());
                scheduler.once("reset", Duration::from_secs(100), next);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_can_re_arm_itself() {
        let scheduler = TokioScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.once(
            "reset",
            Duration::from_secs(100),
            rearming_job(scheduler.clone(), count.clone()),
        );

        tokio::time::sleep(Duration::from_secs(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_registered("reset"));
        scheduler.shutdown();
        assert!(!scheduler.is_registered("reset"));
    }
}
