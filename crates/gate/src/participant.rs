//! Install-stable participant identity.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use sampler_core::{KvStore, ParticipantId, StoreError};

const PARTICIPANT_ID_KEY: &str = "participant_id";

/// Hands out the participant id, generating and persisting it on first use.
#[derive(Clone)]
pub struct ParticipantRegistry {
    kv: Arc<dyn KvStore>,
    create_lock: Arc<Mutex<()>>,
}

impl ParticipantRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            create_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get_or_create(&self) -> Result<ParticipantId, StoreError> {
        let _guard = self.create_lock.lock().await;
        if let Some(raw) = self.kv.get(PARTICIPANT_ID_KEY).await? {
            return raw
                .parse::<ParticipantId>()
                .map_err(|e| StoreError::corrupt(format!("{PARTICIPANT_ID_KEY}: {e}")));
        }

        let id = ParticipantId::generate();
        self.kv
            .set(PARTICIPANT_ID_KEY, id.as_str().to_string())
            .await?;
        info!(participant_id = %id, "generated participant id");
        Ok(id)
    }
}

impl core::fmt::Debug for ParticipantRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParticipantRegistry").finish_non_exhaustive()
    }
}
