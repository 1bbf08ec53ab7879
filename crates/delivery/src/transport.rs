//! Remote delivery port.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use sampler_core::SurveyRecord;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    /// Non-success response, or no response at all (`status: None`).
    Failure { status: Option<u16> },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Sends one survey record to the collector.
///
/// Never retries on its own; retry timing belongs to the outbox.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn send(&self, record: &SurveyRecord) -> DeliveryOutcome;
}

/// Transport that replays scripted outcomes, for tests and dry runs.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    fallback: DeliveryOutcome,
    latency: Option<Duration>,
    sent: Mutex<Vec<SurveyRecord>>,
}

impl ScriptedTransport {
    /// Replay `script` in order, then succeed.
    pub fn new(script: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: DeliveryOutcome::Success,
            latency: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: DeliveryOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            latency: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Wait this long before answering each send.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn sent(&self) -> Vec<SurveyRecord> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn send(&self, record: &SurveyRecord) -> DeliveryOutcome {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
