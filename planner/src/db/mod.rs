//! Candidate store.
//!
//! ```text
//! lifecycle (writes) ──┐
//!                      ▼
//!        CandidateRepository (trait)
//!           │                │
//!   LocalRepository   SqliteRepository
//!    (in-memory)       (Diesel + r2d2)
//!                      ▲
//! scheduler (reads) ───┘
//! ```
//!
//! Use [`RepositoryFactory::create`] with the `[database]` settings to obtain
//! a shared `Arc<dyn CandidateRepository>`.

pub mod checksum;
pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

pub use checksum::{calculate_checksum, candidate_checksum};
pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::DatabaseSettings;
pub use repositories::LocalRepository;
#[cfg(feature = "sqlite-repo")]
pub use repositories::{SqliteConfig, SqliteRepository};
pub use repository::{
    CandidateQuery, CandidateRepository, ErrorContext, RepositoryError, RepositoryResult,
};
