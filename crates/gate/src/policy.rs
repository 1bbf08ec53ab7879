//! Prompt frequency limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits applied by the [`EventGate`](crate::EventGate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Minimum time between two accepted prompts.
    pub min_spacing: Duration,
    /// Accepted prompts per local day.
    pub max_per_day: u32,
    /// Accepted prompts per local week; `None` disables the weekly cap.
    pub max_per_week: Option<u32>,
    /// How long a prompt stays up before it is dismissed automatically.
    pub prompt_timeout: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_secs(60 * 60),
            max_per_day: 2,
            max_per_week: Some(5),
            prompt_timeout: Duration::from_millis(15_000),
        }
    }
}

impl GatePolicy {
    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = spacing;
        self
    }

    pub fn with_max_per_day(mut self, max: u32) -> Self {
        self.max_per_day = max;
        self
    }

    pub fn with_max_per_week(mut self, max: Option<u32>) -> Self {
        self.max_per_week = max;
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }
}
