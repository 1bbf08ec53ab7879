//! Outbox persistence port and the in-memory store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use sampler_core::{StoreError, SubmissionId, SurveyRecord};

/// A survey record waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSubmission {
    pub id: SubmissionId,
    pub record: SurveyRecord,
    /// Earliest time the next delivery attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub attempts: u32,
}

/// Durable record store behind the [`Outbox`](crate::Outbox).
///
/// Implementations must assign unique ids, keep rows across restarts and
/// write each operation atomically.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new row with `attempts = 0` and return its id.
    async fn insert(
        &self,
        record: &SurveyRecord,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<SubmissionId, StoreError>;

    /// Rows with `next_attempt_at <= now`, oldest-due first (ties by id).
    async fn scan_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingSubmission>, StoreError>;

    async fn get(&self, id: SubmissionId) -> Result<Option<PendingSubmission>, StoreError>;

    /// Write `attempts` and `next_attempt_at` together. Returns whether the
    /// row existed.
    async fn reschedule(
        &self,
        id: SubmissionId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Remove a row. Returns whether the row existed.
    async fn delete(&self, id: SubmissionId) -> Result<bool, StoreError>;

    /// Number of rows, due or not.
    async fn count(&self) -> Result<usize, StoreError>;
}

#[async_trait]
impl<T: OutboxStore + ?Sized> OutboxStore for Arc<T> {
    async fn insert(
        &self,
        record: &SurveyRecord,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<SubmissionId, StoreError> {
        (**self).insert(record, next_attempt_at).await
    }

    async fn scan_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingSubmission>, StoreError> {
        (**self).scan_due(now).await
    }

    async fn get(&self, id: SubmissionId) -> Result<Option<PendingSubmission>, StoreError> {
        (**self).get(id).await
    }

    async fn reschedule(
        &self,
        id: SubmissionId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).reschedule(id, attempts, next_attempt_at).await
    }

    async fn delete(&self, id: SubmissionId) -> Result<bool, StoreError> {
        (**self).delete(id).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        (**self).count().await
    }
}

#[derive(Debug, Default)]
struct Rows {
    last_id: i64,
    by_id: BTreeMap<SubmissionId, PendingSubmission>,
}

/// In-memory outbox for tests/dev. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    rows: RwLock<Rows>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(
        &self,
        record: &SurveyRecord,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<SubmissionId, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        rows.last_id += 1;
        let id = SubmissionId::new(rows.last_id);
        rows.by_id.insert(
            id,
            PendingSubmission {
                id,
                record: record.clone(),
                next_attempt_at,
                attempts: 0,
            },
        );
        Ok(id)
    }

    async fn scan_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingSubmission>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        let mut due: Vec<_> = rows
            .by_id
            .values()
            .filter(|row| row.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|row| (row.next_attempt_at, row.id));
        Ok(due)
    }

    async fn get(&self, id: SubmissionId) -> Result<Option<PendingSubmission>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        Ok(rows.by_id.get(&id).cloned())
    }

    async fn reschedule(
        &self,
        id: SubmissionId,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        match rows.by_id.get_mut(&id) {
            Some(row) => {
                row.attempts = attempts;
                row.next_attempt_at = next_attempt_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: SubmissionId) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        Ok(rows.by_id.remove(&id).is_some())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().unwrap_or_else(|p| p.into_inner()).by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sampler_core::{SurveyResponse, SurveyType};

    fn record() -> SurveyRecord {
        SurveyRecord::new(
            SurveyType::Setup,
            "P1".parse().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            vec![SurveyResponse::new("q", "a")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let a = store.insert(&record(), now).await.unwrap();
        let b = store.insert(&record(), now).await.unwrap();
        assert!(b > a);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn scan_orders_by_due_time_then_id() {
        let store = InMemoryOutboxStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let late = store.insert(&record(), now - Duration::minutes(1)).await.unwrap();
        let early = store.insert(&record(), now - Duration::minutes(5)).await.unwrap();
        let tie = store.insert(&record(), now - Duration::minutes(1)).await.unwrap();
        let future = store.insert(&record(), now + Duration::minutes(1)).await.unwrap();

        let due: Vec<_> = store
            .scan_due(now)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(due, vec![early, late, tie]);
        assert!(!due.contains(&future));
    }

    #[tokio::test]
    async fn reschedule_and_delete_report_missing_rows() {
        let store = InMemoryOutboxStore::new();
        let now = Utc::now();
        let id = store.insert(&record(), now).await.unwrap();

        assert!(store.reschedule(id, 1, now + Duration::minutes(1)).await.unwrap());
        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.attempts, 1);

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(!store.reschedule(id, 2, now).await.unwrap());
    }
}
