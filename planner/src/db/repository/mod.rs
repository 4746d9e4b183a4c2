//! Repository abstraction over the candidate store.

pub mod candidate;
pub mod error;

pub use candidate::{
    finish_query, mark_removed, merge_null, merge_update, normalize_timestamps, prepare_insert,
    CandidateQuery, CandidateRepository,
};
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
