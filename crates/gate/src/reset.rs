//! Scheduled counter resets at local day and week boundaries.
//!
//! Each window is a one-shot job armed for the next boundary that re-arms
//! itself after running, so resets stay aligned to local midnight (and local
//! Monday 00:00) regardless of when the process started. Boundaries that
//! passed while the process was down are caught up on install.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use tracing::{info, warn};

use sampler_core::{Clock, JobFuture, Scheduler};

use crate::throttle::ThrottleStore;

pub const DAILY_RESET_JOB: &str = "throttle-daily-reset";
pub const WEEKLY_RESET_JOB: &str = "throttle-weekly-reset";

/// Fallback when a boundary cannot be resolved in local time.
const FALLBACK_DELAY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetWindow {
    Daily,
    Weekly,
}

impl ResetWindow {
    pub fn job_name(self) -> &'static str {
        match self {
            Self::Daily => DAILY_RESET_JOB,
            Self::Weekly => WEEKLY_RESET_JOB,
        }
    }

    /// Local date on which the window containing `now` started.
    pub fn start_containing<Tz: TimeZone>(self, now: &DateTime<Tz>) -> NaiveDate {
        let today = now.date_naive();
        match self {
            Self::Daily => today,
            Self::Weekly => today
                .checked_sub_days(chrono::Days::new(u64::from(
                    today.weekday().num_days_from_monday(),
                )))
                .unwrap_or(today),
        }
    }

    /// Time from `now` to the next boundary of this window in `now`'s zone.
    pub fn until_next_boundary<Tz: TimeZone>(self, now: &DateTime<Tz>) -> Duration {
        let today = now.date_naive();
        let days_ahead = match self {
            Self::Daily => 1,
            Self::Weekly => 7 - u64::from(today.weekday().num_days_from_monday()),
        };

        let Some(boundary) = start_of_day(&now.timezone(), today, days_ahead) else {
            return FALLBACK_DELAY;
        };
        (boundary - now.clone())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(FALLBACK_DELAY)
    }
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, from: NaiveDate, days_ahead: u64) -> Option<DateTime<Tz>> {
    let day = from.checked_add_days(chrono::Days::new(days_ahead))?;
    let midnight = day.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight).earliest()
}

/// Installs and runs the daily and weekly reset jobs.
#[derive(Clone)]
pub struct ResetJobs {
    scheduler: Arc<dyn Scheduler>,
    throttle: Arc<ThrottleStore>,
    clock: Arc<dyn Clock>,
}

impl ResetJobs {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        throttle: Arc<ThrottleStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduler,
            throttle,
            clock,
        }
    }

    /// Clear counters whose window ended while nothing was running, then
    /// arm both windows for their next local boundary.
    pub async fn install(&self) {
        if let Err(e) = self.throttle.catch_up(self.clock.now()).await {
            warn!(error = %e, "throttle catch-up failed; the next gate check retries");
        }
        self.arm(ResetWindow::Daily);
        self.arm(ResetWindow::Weekly);
    }

    /// Zero the window's counter. Failures are logged; the next boundary
    /// tries again.
    pub async fn run(&self, window: ResetWindow) {
        match self.throttle.reset(window, self.clock.now()).await {
            Ok(()) => info!(job = window.job_name(), "throttle counter reset"),
            Err(e) => warn!(job = window.job_name(), error = %e, "throttle counter reset failed"),
        }
    }

    fn arm(&self, window: ResetWindow) {
        let now = self.clock.now().with_timezone(&Local);
        let delay = window.until_next_boundary(&now);
        let jobs = self.clone();
        self.scheduler.once(
            window.job_name(),
            delay,
            Box::new(move || -> JobFuture {
                Box::pin(async move {
                    jobs.run(window).await;
                    jobs.arm(window);
                })
            }),
        );
    }
}

impl core::fmt::Debug for ResetJobs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResetJobs").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use sampler_core::{InMemoryKvStore, ManualClock, ManualScheduler};

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn daily_boundary_is_next_local_midnight() {
        let now = at("2024-05-01T23:30:00+02:00");
        assert_eq!(
            ResetWindow::Daily.until_next_boundary(&now),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn weekly_boundary_is_next_monday() {
        // Wednesday noon -> Monday 00:00 is 4.5 days away.
        let now = at("2024-05-01T12:00:00+00:00");
        assert_eq!(
            ResetWindow::Weekly.until_next_boundary(&now),
            Duration::from_secs(4 * 86_400 + 12 * 3_600)
        );

        // Monday midnight itself waits a full week.
        let now = at("2024-05-06T00:00:00+00:00");
        assert_eq!(
            ResetWindow::Weekly.until_next_boundary(&now),
            Duration::from_secs(7 * 86_400)
        );
    }

    #[tokio::test]
    async fn reset_job_zeroes_counter_and_rearms() {
        let scheduler = ManualScheduler::arc();
        let throttle = Arc::new(ThrottleStore::new(InMemoryKvStore::arc()));
        let clock = Arc::new(ManualClock::new(
            at("2024-05-01T12:00:00+00:00").with_timezone(&Utc),
        ));
        let now = clock.now();
        throttle.transact(now, |s| s.record_prompt(now)).await.unwrap();

        let jobs = ResetJobs::new(scheduler.clone(), throttle.clone(), clock);
        jobs.install().await;
        assert!(scheduler.is_registered(DAILY_RESET_JOB));
        assert!(scheduler.is_registered(WEEKLY_RESET_JOB));

        assert!(scheduler.fire(DAILY_RESET_JOB).await);
        let state = throttle.load().await.unwrap();
        assert_eq!(state.daily_count, 0);
        assert_eq!(state.weekly_count, 1);
        assert_eq!(state.last_prompt_at, Some(now));
        assert!(scheduler.is_registered(DAILY_RESET_JOB));
    }

    fn local(day: u32, hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2024, 5, day, hour, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn window_start_is_local_day_and_monday() {
        let wednesday = at("2024-05-01T12:00:00+00:00");
        let may = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        assert_eq!(ResetWindow::Daily.start_containing(&wednesday), may(1));
        assert_eq!(
            ResetWindow::Weekly.start_containing(&wednesday),
            NaiveDate::from_ymd_opt(2024, 4, 29).unwrap()
        );
        let monday = at("2024-05-06T00:00:00+00:00");
        assert_eq!(ResetWindow::Weekly.start_containing(&monday), may(6));
    }

    #[tokio::test]
    async fn install_after_missed_midnight_clears_daily_counter() {
        let kv = InMemoryKvStore::arc();
        {
            let throttle = ThrottleStore::new(kv.clone());
            for hour in [20, 22] {
                let shown = local(1, hour);
                throttle.transact(shown, |s| s.record_prompt(shown)).await.unwrap();
            }
        }

        // Down over midnight; back up Thursday morning.
        let scheduler = ManualScheduler::arc();
        let throttle = Arc::new(ThrottleStore::new(kv));
        let clock = Arc::new(ManualClock::new(local(2, 10)));
        ResetJobs::new(scheduler.clone(), throttle.clone(), clock)
            .install()
            .await;

        let state = throttle.load().await.unwrap();
        assert_eq!(state.daily_count, 0);
        assert_eq!(state.weekly_count, 2);
        assert_eq!(state.last_prompt_at, Some(local(1, 22)));
        assert!(scheduler.is_registered(DAILY_RESET_JOB));
    }

    #[tokio::test]
    async fn install_after_missed_monday_clears_weekly_counter() {
        let kv = InMemoryKvStore::arc();
        let saturday = local(4, 15);
        ThrottleStore::new(kv.clone())
            .transact(saturday, |s| s.record_prompt(saturday))
            .await
            .unwrap();

        let throttle = Arc::new(ThrottleStore::new(kv));
        let clock = Arc::new(ManualClock::new(local(7, 9)));
        ResetJobs::new(ManualScheduler::arc(), throttle.clone(), clock)
            .install()
            .await;

        let state = throttle.load().await.unwrap();
        assert_eq!(state.daily_count, 0);
        assert_eq!(state.weekly_count, 0);
        assert_eq!(state.last_prompt_at, Some(saturday));
    }
}
