//! Onboarding flags written by the external consent and setup flows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use sampler_core::{KvStore, StoreError};

const CONSENT_KEY: &str = "consent";
const SETUP_KEY: &str = "setup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    #[default]
    Pending,
    Granted,
    Rejected,
}

impl ConsentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Rejected => "rejected",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "granted" => Some(Self::Granted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupState {
    #[default]
    Pending,
    Completed,
}

impl SetupState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Snapshot of the onboarding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readiness {
    pub consent: ConsentState,
    pub setup: SetupState,
}

impl Readiness {
    /// Prompts are allowed only after consent and the setup survey.
    pub fn is_ready(&self) -> bool {
        self.consent == ConsentState::Granted && self.setup == SetupState::Completed
    }
}

/// Reads and writes [`Readiness`] in the key/value store.
#[derive(Clone)]
pub struct ReadinessStore {
    kv: Arc<dyn KvStore>,
}

impl ReadinessStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Missing flags read as pending; unrecognised values are corrupt.
    pub async fn load(&self) -> Result<Readiness, StoreError> {
        let consent = match self.kv.get(CONSENT_KEY).await? {
            Some(raw) => ConsentState::parse(&raw)
                .ok_or_else(|| StoreError::corrupt(format!("{CONSENT_KEY}: {raw}")))?,
            None => ConsentState::Pending,
        };
        let setup = match self.kv.get(SETUP_KEY).await? {
            Some(raw) => SetupState::parse(&raw)
                .ok_or_else(|| StoreError::corrupt(format!("{SETUP_KEY}: {raw}")))?,
            None => SetupState::Pending,
        };
        Ok(Readiness { consent, setup })
    }

    pub async fn set_consent(&self, state: ConsentState) -> Result<(), StoreError> {
        self.kv.set(CONSENT_KEY, state.as_str().to_string()).await
    }

    pub async fn set_setup(&self, state: SetupState) -> Result<(), StoreError> {
        self.kv.set(SETUP_KEY, state.as_str().to_string()).await
    }
}

impl core::fmt::Debug for ReadinessStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadinessStore").finish_non_exhaustive()
    }
}
