//! Candidate repository trait and the merge rules shared by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{truncate_to_second, Candidate, CandidateField, CandidateId, CandidateUpdate};

/// Conjunctive filter for [`CandidateRepository::query`].
///
/// Results are ordered by `date_added`, then by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateQuery {
    pub candidate_type: Option<String>,
    pub exclude_removed: bool,
    pub exclude_rejected: bool,
    pub added_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl CandidateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, candidate_type: impl Into<String>) -> Self {
        self.candidate_type = Some(candidate_type.into());
        self
    }

    pub fn not_removed(mut self) -> Self {
        self.exclude_removed = true;
        self
    }

    pub fn not_rejected(mut self) -> Self {
        self.exclude_rejected = true;
        self
    }

    /// Only candidates whose `date_added` is at or after `since`.
    pub fn added_since(mut self, since: DateTime<Utc>) -> Self {
        self.added_since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation of the predicate.
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if let Some(ref t) = self.candidate_type {
            if &candidate.candidate_type != t {
                return false;
            }
        }
        if self.exclude_removed && candidate.is_removed() {
            return false;
        }
        if self.exclude_rejected && candidate.is_rejected() {
            return false;
        }
        if let Some(since) = self.added_since {
            if candidate.date_added < since {
                return false;
            }
        }
        true
    }
}

/// Durable mapping `id -> Candidate`.
///
/// Single-record reads and writes are atomic. `update` merges field by field,
/// so concurrent writers touching different fields both win and the later
/// writer wins on a shared field.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// Check if the store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Store a new candidate. Fails with `AlreadyExists` when the id is taken.
    async fn insert(&self, candidate: &Candidate) -> RepositoryResult<CandidateId>;

    /// Fetch one candidate by id.
    async fn get(&self, id: &CandidateId) -> RepositoryResult<Option<Candidate>>;

    /// Merge the set fields of `update` and stamp `date_last_edited`.
    ///
    /// Returns the stored record after the write. On an invariant violation
    /// the record is left untouched and `ValidationError` is returned.
    async fn update(&self, id: &CandidateId, update: &CandidateUpdate)
        -> RepositoryResult<Candidate>;

    /// Clear one nullable field and stamp `date_last_edited`.
    async fn set_null(&self, id: &CandidateId, field: CandidateField)
        -> RepositoryResult<Candidate>;

    /// All candidates matching `query`.
    async fn query(&self, query: &CandidateQuery) -> RepositoryResult<Vec<Candidate>>;

    /// Tombstone a candidate. Removing twice keeps the first reason.
    async fn remove(&self, id: &CandidateId, reason: &str) -> RepositoryResult<Candidate>;

    /// Number of stored candidates, tombstones included.
    async fn count(&self) -> RepositoryResult<usize>;
}

/// Bring every timestamp to whole seconds, matching the storage format.
pub fn normalize_timestamps(candidate: &mut Candidate) {
    candidate.date_added = truncate_to_second(candidate.date_added);
    for slot in [
        &mut candidate.updated,
        &mut candidate.transit_time,
        &mut candidate.start_observability,
        &mut candidate.end_observability,
        &mut candidate.removed_dt,
        &mut candidate.date_last_edited,
    ] {
        *slot = slot.map(truncate_to_second);
    }
}

fn validated(candidate: Candidate, operation: &str) -> RepositoryResult<Candidate> {
    match candidate.validate() {
        Ok(()) => Ok(candidate),
        Err(message) => Err(RepositoryError::validation_with_context(
            message,
            ErrorContext::new(operation)
                .with_entity("candidate")
                .with_entity_id(&candidate.id),
        )),
    }
}

/// Prepare a record for insertion.
pub fn prepare_insert(candidate: &Candidate, now: DateTime<Utc>) -> RepositoryResult<Candidate> {
    let mut record = candidate.clone();
    record.date_last_edited = Some(now);
    normalize_timestamps(&mut record);
    validated(record, "insert")
}

/// Merge `update` onto `current`, returning the record to write.
pub fn merge_update(
    current: &Candidate,
    update: &CandidateUpdate,
    now: DateTime<Utc>,
) -> RepositoryResult<Candidate> {
    let mut record = current.clone();
    record.apply(update);
    record.date_last_edited = Some(now);
    normalize_timestamps(&mut record);
    validated(record, "update")
}

/// Clear `field` on `current`, returning the record to write.
pub fn merge_null(
    current: &Candidate,
    field: CandidateField,
    now: DateTime<Utc>,
) -> RepositoryResult<Candidate> {
    let mut record = current.clone();
    record.clear(field);
    record.date_last_edited = Some(now);
    normalize_timestamps(&mut record);
    validated(record, "set_null")
}

/// Tombstone `current`; `None` when it is already removed.
pub fn mark_removed(current: &Candidate, reason: &str, now: DateTime<Utc>) -> Option<Candidate> {
    if current.is_removed() {
        return None;
    }
    let mut record = current.clone();
    record.removed_reason = Some(reason.to_string());
    record.removed_dt = Some(now);
    record.date_last_edited = Some(now);
    normalize_timestamps(&mut record);
    Some(record)
}

/// Order and truncate query results the same way on every backend.
pub fn finish_query(mut candidates: Vec<Candidate>, query: &CandidateQuery) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.date_added
            .cmp(&b.date_added)
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = query.limit {
        candidates.truncate(limit);
    }
    candidates
}
