//! Durable queue of completed surveys awaiting delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use sampler_core::{Clock, DomainError, StoreError, SubmissionId, SurveyRecord};

use crate::retry::RetryPolicy;
use crate::store::{OutboxStore, PendingSubmission};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outbox bookkeeping on top of an [`OutboxStore`].
///
/// A row is created by [`Outbox::enqueue`], rescheduled only by
/// [`Outbox::mark_failed`] and removed only by [`Outbox::mark_delivered`].
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Persist a completed survey for later delivery. Purely local.
    pub async fn enqueue(&self, record: SurveyRecord) -> Result<SubmissionId, OutboxError> {
        record.validate()?;
        let next_attempt_at = self.policy.next_attempt_at(self.clock.now(), 0);
        let id = self.store.insert(&record, next_attempt_at).await?;
        info!(
            submission_id = %id,
            survey_type = %record.survey_type,
            "survey queued for delivery"
        );
        Ok(id)
    }

    /// Every row due at `now`, oldest-due first. Does not modify anything.
    pub async fn due_items(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SubmissionId, SurveyRecord)>, OutboxError> {
        let rows = self.store.scan_due(now).await?;
        Ok(rows.into_iter().map(|row| (row.id, row.record)).collect())
    }

    pub async fn get(&self, id: SubmissionId) -> Result<Option<PendingSubmission>, OutboxError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn pending_count(&self) -> Result<usize, OutboxError> {
        Ok(self.store.count().await?)
    }

    /// Remove a delivered row. Removing an absent id is a no-op.
    pub async fn mark_delivered(&self, id: SubmissionId) -> Result<(), OutboxError> {
        if self.store.delete(id).await? {
            info!(submission_id = %id, "survey delivered");
        } else {
            debug!(submission_id = %id, "delivered submission already gone");
        }
        Ok(())
    }

    /// Count a failed attempt and push the row back by the retry delay.
    ///
    /// Returns the updated row, or `None` when the id no longer exists.
    pub async fn mark_failed(
        &self,
        id: SubmissionId,
    ) -> Result<Option<PendingSubmission>, OutboxError> {
        let Some(mut row) = self.store.get(id).await? else {
            warn!(submission_id = %id, "failed submission not found; ignoring");
            return Ok(None);
        };

        row.attempts = row.attempts.saturating_add(1);
        let next = self.policy.next_attempt_at(self.clock.now(), row.attempts);
        row.next_attempt_at = next.max(row.next_attempt_at);

        if !self
            .store
            .reschedule(id, row.attempts, row.next_attempt_at)
            .await?
        {
            warn!(submission_id = %id, "failed submission vanished before reschedule");
            return Ok(None);
        }

        info!(
            submission_id = %id,
            attempts = row.attempts,
            next_attempt_at = %row.next_attempt_at,
            "delivery failed; retry scheduled"
        );
        Ok(Some(row))
    }
}

impl core::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Outbox")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
