//! Persisted prompt-frequency state.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::info;

use sampler_core::{KvStore, StoreError};

use crate::reset::ResetWindow;

const LAST_PROMPT_AT_KEY: &str = "throttle.last_prompt_at";
const DAILY_COUNT_KEY: &str = "throttle.daily_count";
const WEEKLY_COUNT_KEY: &str = "throttle.weekly_count";
const DAILY_WINDOW_KEY: &str = "throttle.daily_window";
const WEEKLY_WINDOW_KEY: &str = "throttle.weekly_window";
const WINDOW_FORMAT: &str = "%Y-%m-%d";

/// Counters and timestamp governing how often prompts may appear.
///
/// A fresh install has no prompt time and zero counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    pub last_prompt_at: Option<DateTime<Utc>>,
    pub daily_count: u32,
    pub weekly_count: u32,
}

impl ThrottleState {
    /// Record an accepted prompt.
    pub fn record_prompt(&mut self, at: DateTime<Utc>) {
        self.daily_count = self.daily_count.saturating_add(1);
        self.weekly_count = self.weekly_count.saturating_add(1);
        self.last_prompt_at = Some(at);
    }
}

/// Local start dates of the daily and weekly windows the counters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Windows {
    daily: NaiveDate,
    weekly: NaiveDate,
}

impl Windows {
    fn containing(now: DateTime<Utc>) -> Self {
        let local = now.with_timezone(&Local);
        Self {
            daily: ResetWindow::Daily.start_containing(&local),
            weekly: ResetWindow::Weekly.start_containing(&local),
        }
    }
}

/// [`ThrottleState`] on top of a [`KvStore`].
///
/// Every mutation goes through one lock, so a reset job can never land in the
/// middle of the gate's read-modify-write.
///
/// Alongside the counters the store keeps the local start date of the window
/// each counter was last written in. A counter whose window has ended reads
/// as zero on the next [`ThrottleStore::transact`], so a boundary that passed
/// while the process was down still resets it.
pub struct ThrottleStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl ThrottleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the state as stored. Missing keys read as zero / none.
    pub async fn load(&self) -> Result<ThrottleState, StoreError> {
        let last_prompt_at = match self.kv.get(LAST_PROMPT_AT_KEY).await? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| StoreError::corrupt(format!("{LAST_PROMPT_AT_KEY}: {e}")))?,
            ),
            None => None,
        };

        Ok(ThrottleState {
            last_prompt_at,
            daily_count: self.load_count(DAILY_COUNT_KEY).await?,
            weekly_count: self.load_count(WEEKLY_COUNT_KEY).await?,
        })
    }

    /// Read-modify-write at `now`. Counters from an earlier window are
    /// zeroed before `f` sees the state; the state is written back (all
    /// fields in one batch) only if something changed.
    pub async fn transact<T, F>(&self, now: DateTime<Utc>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut ThrottleState) -> T,
    {
        let _guard = self.write_lock.lock().await;
        let mut before = self.load().await?;
        let (windows, rolled) = self.roll_over(&mut before, Windows::containing(now)).await?;

        let mut after = before.clone();
        let out = f(&mut after);
        if rolled || after != before {
            self.save(&after, windows).await?;
        }
        Ok(out)
    }

    /// Apply any window roll-over due at `now` without other changes.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.transact(now, |_| ()).await
    }

    /// Zero one counter and start its window at `now`. Never touches
    /// `last_prompt_at` or the other counter.
    pub async fn reset(&self, window: ResetWindow, now: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let windows = Windows::containing(now);
        let (count_key, window_key, start) = match window {
            ResetWindow::Daily => (DAILY_COUNT_KEY, DAILY_WINDOW_KEY, windows.daily),
            ResetWindow::Weekly => (WEEKLY_COUNT_KEY, WEEKLY_WINDOW_KEY, windows.weekly),
        };
        self.kv
            .set_many(&[
                (count_key, "0".to_string()),
                (window_key, start.format(WINDOW_FORMAT).to_string()),
            ])
            .await
    }

    /// Zero every counter whose stored window is missing or older than
    /// `current`. Returns the windows to persist and whether any differ
    /// from what is stored. A stored window later than `current` (clock
    /// moved back) is kept.
    async fn roll_over(
        &self,
        state: &mut ThrottleState,
        current: Windows,
    ) -> Result<(Windows, bool), StoreError> {
        let stored_daily = self.load_window(DAILY_WINDOW_KEY).await?;
        let stored_weekly = self.load_window(WEEKLY_WINDOW_KEY).await?;

        if stored_daily.is_none_or(|d| d < current.daily) {
            if state.daily_count > 0 {
                info!(window = %current.daily, "daily window passed; counter cleared");
            }
            state.daily_count = 0;
        }
        if stored_weekly.is_none_or(|w| w < current.weekly) {
            if state.weekly_count > 0 {
                info!(window = %current.weekly, "weekly window passed; counter cleared");
            }
            state.weekly_count = 0;
        }

        let windows = Windows {
            daily: stored_daily.map_or(current.daily, |d| d.max(current.daily)),
            weekly: stored_weekly.map_or(current.weekly, |w| w.max(current.weekly)),
        };
        let changed = stored_daily != Some(windows.daily) || stored_weekly != Some(windows.weekly);
        Ok((windows, changed))
    }

    async fn save(&self, state: &ThrottleState, windows: Windows) -> Result<(), StoreError> {
        let mut entries = vec![
            (DAILY_COUNT_KEY, state.daily_count.to_string()),
            (WEEKLY_COUNT_KEY, state.weekly_count.to_string()),
            (DAILY_WINDOW_KEY, windows.daily.format(WINDOW_FORMAT).to_string()),
            (WEEKLY_WINDOW_KEY, windows.weekly.format(WINDOW_FORMAT).to_string()),
        ];
        if let Some(at) = state.last_prompt_at {
            entries.push((
                LAST_PROMPT_AT_KEY,
                at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        self.kv.set_many(&entries).await
    }

    async fn load_count(&self, key: &str) -> Result<u32, StoreError> {
        match self.kv.get(key).await? {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| StoreError::corrupt(format!("{key}: {e}"))),
            None => Ok(0),
        }
    }

    async fn load_window(&self, key: &str) -> Result<Option<NaiveDate>, StoreError> {
        match self.kv.get(key).await? {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), WINDOW_FORMAT)
                .map(Some)
                .map_err(|e| StoreError::corrupt(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }
}

impl core::fmt::Debug for ThrottleStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThrottleStore").finish_non_exhaustive()
    }
}
