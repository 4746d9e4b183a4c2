//! In-memory local repository implementation.
//!
//! Suitable for unit tests and dry runs. Data lives in a `HashMap` behind a
//! `parking_lot::RwLock`; writers wait at most `busy_timeout` for the lock and
//! then fail with `Busy`, the same contract the SQLite backend offers.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::db::repository::*;
use crate::models::{Candidate, CandidateField, CandidateId, CandidateUpdate};

/// Default bounded wait for the write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

/// In-memory local repository.
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
    busy_timeout: Duration,
}

struct LocalData {
    candidates: HashMap<CandidateId, Candidate>,
    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            candidates: HashMap::new(),
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self::with_busy_timeout(DEFAULT_BUSY_TIMEOUT)
    }

    /// Create a repository whose writers give up after `busy_timeout`.
    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
            busy_timeout,
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        self.data.write().candidates.clear();
    }

    /// Copy of every stored record, sorted like a query result.
    pub fn snapshot(&self) -> Vec<Candidate> {
        let data = self.data.read();
        finish_query(
            data.candidates.values().cloned().collect(),
            &CandidateQuery::new(),
        )
    }

    /// Hold the write lock for `hold`; used by tests to simulate contention.
    pub fn hold_write_lock(&self, hold: Duration) {
        let _guard = self.data.write();
        std::thread::sleep(hold);
    }

    fn read(&self, operation: &str) -> RepositoryResult<RwLockReadGuard<'_, LocalData>> {
        let data = self.data.try_read_for(self.busy_timeout).ok_or_else(|| {
            RepositoryError::busy_with_context(
                "Timed out waiting for read lock",
                ErrorContext::new(operation).with_entity("candidate"),
            )
        })?;
        if !data.is_healthy {
            return Err(RepositoryError::connection("Database is not healthy")
                .with_operation(operation));
        }
        Ok(data)
    }

    fn write(&self, operation: &str) -> RepositoryResult<RwLockWriteGuard<'_, LocalData>> {
        let data = self.data.try_write_for(self.busy_timeout).ok_or_else(|| {
            RepositoryError::busy_with_context(
                "Timed out waiting for write lock",
                ErrorContext::new(operation).with_entity("candidate"),
            )
        })?;
        if !data.is_healthy {
            return Err(RepositoryError::connection("Database is not healthy")
                .with_operation(operation));
        }
        Ok(data)
    }

    /// Read-merge-write of one record under the write lock.
    fn mutate<F>(&self, operation: &str, id: &CandidateId, merge: F) -> RepositoryResult<Candidate>
    where
        F: FnOnce(&Candidate) -> RepositoryResult<Option<Candidate>>,
    {
        let mut data = self.write(operation)?;
        let current = data.candidates.get(id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Candidate {} not found", id),
                ErrorContext::new(operation)
                    .with_entity("candidate")
                    .with_entity_id(id),
            )
        })?;
        match merge(current)? {
            Some(next) => {
                data.candidates.insert(id.clone(), next.clone());
                Ok(next)
            }
            None => Ok(current.clone()),
        }
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn insert(&self, candidate: &Candidate) -> RepositoryResult<CandidateId> {
        let record = prepare_insert(candidate, Utc::now())?;
        let mut data = self.write("insert")?;
        if data.candidates.contains_key(&record.id) {
            return Err(RepositoryError::already_exists_with_context(
                format!("Candidate {} already stored", record.name),
                ErrorContext::new("insert")
                    .with_entity("candidate")
                    .with_entity_id(&record.id),
            ));
        }
        let id = record.id.clone();
        data.candidates.insert(id.clone(), record);
        Ok(id)
    }

    async fn get(&self, id: &CandidateId) -> RepositoryResult<Option<Candidate>> {
        Ok(self.read("get")?.candidates.get(id).cloned())
    }

    async fn update(
        &self,
        id: &CandidateId,
        update: &CandidateUpdate,
    ) -> RepositoryResult<Candidate> {
        self.mutate("update", id, |current| {
            merge_update(current, update, Utc::now()).map(Some)
        })
    }

    async fn set_null(
        &self,
        id: &CandidateId,
        field: CandidateField,
    ) -> RepositoryResult<Candidate> {
        self.mutate("set_null", id, |current| {
            merge_null(current, field, Utc::now()).map(Some)
        })
    }

    async fn query(&self, query: &CandidateQuery) -> RepositoryResult<Vec<Candidate>> {
        let data = self.read("query")?;
        let matching = data
            .candidates
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        Ok(finish_query(matching, query))
    }

    async fn remove(&self, id: &CandidateId, reason: &str) -> RepositoryResult<Candidate> {
        self.mutate("remove", id, |current| {
            Ok(mark_removed(current, reason, Utc::now()))
        })
    }

    async fn count(&self) -> RepositoryResult<usize> {
        Ok(self.read("count")?.candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RejectedReason, MPC_NEO};
    use chrono::TimeZone;

    fn sample(name: &str) -> Candidate {
        let mut c = Candidate::new(
            name,
            MPC_NEO,
            "test",
            Utc.with_ymd_and_hms(2024, 10, 19, 1, 0, 0).unwrap(),
        );
        c.magnitude = Some(20.0);
        c
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = LocalRepository::new();
        assert!(repo.health_check().await.unwrap());

        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        assert!(repo.count().await.is_err());
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = LocalRepository::new();
        let c = sample("P21aaaa");
        let id = repo.insert(&c).await.unwrap();
        assert_eq!(id, c.id);

        let stored = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.name, "P21aaaa");
        assert!(stored.date_last_edited.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let repo = LocalRepository::new();
        let c = sample("P21aaaa");
        repo.insert(&c).await.unwrap();
        let result = repo.insert(&c).await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_update_and_set_null() {
        let repo = LocalRepository::new();
        let id = repo.insert(&sample("P21aaaa")).await.unwrap();

        let updated = repo
            .update(
                &id,
                &CandidateUpdate {
                    rejected_reason: Some(RejectedReason::Rmse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.rejected_reason, Some(RejectedReason::Rmse));
        assert_eq!(updated.magnitude, Some(20.0));

        let cleared = repo
            .set_null(&id, CandidateField::RejectedReason)
            .await
            .unwrap();
        assert!(cleared.rejected_reason.is_none());
    }

    #[tokio::test]
    async fn test_not_found_error() {
        let repo = LocalRepository::new();
        let id = CandidateId::from_raw("missing");
        assert!(repo.get(&id).await.unwrap().is_none());
        let result = repo.update(&id, &CandidateUpdate::default()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_tombstones() {
        let repo = LocalRepository::new();
        let id = repo.insert(&sample("P21aaaa")).await.unwrap();
        repo.remove(&id, "Target removed from MPC list").await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let live = repo
            .query(&CandidateQuery::new().not_removed())
            .await
            .unwrap();
        assert!(live.is_empty());
    }

    #[tokio::test]
    async fn test_busy_when_lock_is_held() {
        let repo = LocalRepository::with_busy_timeout(Duration::from_millis(20));
        let holder = repo.clone();
        let handle = std::thread::spawn(move || holder.hold_write_lock(Duration::from_millis(300)));
        std::thread::sleep(Duration::from_millis(50));

        let result = repo.insert(&sample("P21aaaa")).await;
        assert!(matches!(result, Err(RepositoryError::Busy { .. })));
        handle.join().unwrap();
    }
}
