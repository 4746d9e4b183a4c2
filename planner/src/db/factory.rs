//! Repository factory for dependency injection.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::repo_config::DatabaseSettings;
use super::repositories::LocalRepository;
#[cfg(feature = "sqlite-repo")]
use super::repositories::SqliteRepository;
use super::repository::{CandidateRepository, RepositoryResult};

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// SQLite file through Diesel
    Sqlite,
    /// In-memory local repository
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "file" => Ok(Self::Sqlite),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

/// Repository factory for creating repository instances.
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create the repository selected by `[database]`.
    pub fn create(settings: &DatabaseSettings) -> RepositoryResult<Arc<dyn CandidateRepository>> {
        match settings.repository_type()? {
            RepositoryType::Sqlite => {
                #[cfg(feature = "sqlite-repo")]
                {
                    let repo = SqliteRepository::new(settings.to_sqlite_config())?;
                    Ok(Arc::new(repo) as Arc<dyn CandidateRepository>)
                }
                #[cfg(not(feature = "sqlite-repo"))]
                {
                    Err(super::repository::RepositoryError::configuration(
                        "SQLite repository feature not enabled",
                    ))
                }
            }
            RepositoryType::Local => {
                log::warn!("Using in-memory candidate store; nothing will be persisted");
                Ok(Self::create_local(settings))
            }
        }
    }

    /// Create an in-memory local repository.
    pub fn create_local(settings: &DatabaseSettings) -> Arc<dyn CandidateRepository> {
        Arc::new(LocalRepository::with_busy_timeout(Duration::from_millis(
            settings.effective_busy_timeout_ms(),
        )))
    }
}
