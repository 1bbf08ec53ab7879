//! SQLite-backed outbox store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use sampler_core::{StoreError, SubmissionId, SurveyRecord};
use sampler_delivery::{OutboxStore, PendingSubmission};

use crate::db::map_sqlx_error;

/// [`OutboxStore`] on the `pending_submissions` table.
///
/// Ids come from `AUTOINCREMENT`, so they are never reused even after the
/// newest row is deleted. Due scans use the `(next_attempt_at, id)` index.
/// Timestamps are stored as Unix milliseconds.
///
/// A due row that cannot be decoded is moved to `quarantined_submissions`
/// during the scan, so it never blocks delivery of the other rows.
#[derive(Debug, Clone)]
pub struct SqliteOutboxStore {
    pool: SqlitePool,
}

impl SqliteOutboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SqliteOutboxStore {
    /// Move row `id` out of the pending table, keeping its raw columns.
    async fn quarantine(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_quarantine", e))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO quarantined_submissions
                (id, record, next_attempt_at, attempts, reason, quarantined_at)
            SELECT id, record, next_attempt_at, attempts, ?2, ?3
            FROM pending_submissions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("quarantine_submission", e))?;

        sqlx::query("DELETE FROM pending_submissions WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("quarantine_submission", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_quarantine", e))
    }

    /// Rows moved aside by [`OutboxStore::scan_due`].
    pub async fn quarantined_count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quarantined_submissions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_quarantined", e))?;

        usize::try_from(count).map_err(|e| StoreError::corrupt(format!("row count: {e}")))
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn insert(
        &self,
        record: &SurveyRecord,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<SubmissionId, StoreError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| StoreError::corrupt(format!("failed to encode survey record: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO pending_submissions (record, next_attempt_at, attempts)
            VALUES (?1, ?2, 0)
            "#,
        )
        .bind(payload)
        .bind(next_attempt_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_submission", e))?;

        Ok(SubmissionId::new(result.last_insert_rowid()))
    }

    async fn scan_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingSubmission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, record, next_attempt_at, attempts
            FROM pending_submissions
            WHERE next_attempt_at <= ?1
            ORDER BY next_attempt_at ASC, id ASC
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("scan_due", e))?;

        let mut due = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_submission(row) {
                Ok(submission) => due.push(submission),
                Err(StoreError::Corrupt(reason)) => {
                    let id: i64 = row
                        .try_get("id")
                        .map_err(|e| map_sqlx_error("decode_id", e))?;
                    warn!(submission_id = id, reason = %reason, "quarantining undecodable submission");
                    self.quarantine(id, &reason, now).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(due)
    }

    async fn get(&self, id: SubmissionId) -> Result<Option<PendingSubmission>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, record, next_attempt_at, attempts
            FROM pending_submissions
            WHERE id = ?1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_submission", e))?;

        row.as_ref().map(row_to_submission).transpose()
    }

    async fn reschedule(
        &self,
        id: SubmissionId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_submissions
            SET attempts = ?2,
                next_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.get())
        .bind(i64::from(attempts))
        .bind(next_attempt_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reschedule_submission", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: SubmissionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pending_submissions WHERE id = ?1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_submission", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_submissions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_submissions", e))?;

        usize::try_from(count).map_err(|e| StoreError::corrupt(format!("row count: {e}")))
    }
}

fn row_to_submission(row: &SqliteRow) -> Result<PendingSubmission, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("decode_id", e))?;
    let payload: String = row
        .try_get("record")
        .map_err(|e| map_sqlx_error("decode_record", e))?;
    let next_ms: i64 = row
        .try_get("next_attempt_at")
        .map_err(|e| map_sqlx_error("decode_next_attempt_at", e))?;
    let attempts: i64 = row
        .try_get("attempts")
        .map_err(|e| map_sqlx_error("decode_attempts", e))?;

    let record: SurveyRecord = serde_json::from_str(&payload)
        .map_err(|e| StoreError::corrupt(format!("submission {id}: bad record: {e}")))?;
    let next_attempt_at = DateTime::<Utc>::from_timestamp_millis(next_ms)
        .ok_or_else(|| StoreError::corrupt(format!("submission {id}: bad timestamp {next_ms}")))?;
    let attempts = u32::try_from(attempts)
        .map_err(|e| StoreError::corrupt(format!("submission {id}: bad attempts: {e}")))?;

    Ok(PendingSubmission {
        id: SubmissionId::new(id),
        record,
        next_attempt_at,
        attempts,
    })
}
