//! `[database]` section of the planner configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::factory::RepositoryType;
use super::repository::RepositoryError;

/// Candidate store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// `"sqlite"` or `"local"`
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_candidate_db_path")]
    pub candidate_db_path: PathBuf,
    /// Lifecycle cycle interval.
    #[serde(default = "default_database_wait_time_minutes")]
    pub database_wait_time_minutes: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_repository() -> String {
    "sqlite".to_string()
}

fn default_candidate_db_path() -> PathBuf {
    PathBuf::from("candidates.db")
}

fn default_database_wait_time_minutes() -> u64 {
    15
}

fn default_busy_timeout_ms() -> u64 {
    2000
}

fn default_max_connections() -> u32 {
    4
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            candidate_db_path: default_candidate_db_path(),
            database_wait_time_minutes: default_database_wait_time_minutes(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl DatabaseSettings {
    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, RepositoryError> {
        RepositoryType::from_str(&self.repository)
            .map_err(|e| RepositoryError::configuration(format!("Invalid repository type: {}", e)))
    }

    /// Busy wait actually applied; never below two seconds.
    pub fn effective_busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.max(2000)
    }

    /// Convert to the SQLite backend configuration.
    #[cfg(feature = "sqlite-repo")]
    pub fn to_sqlite_config(&self) -> super::SqliteConfig {
        super::SqliteConfig {
            database_path: self.candidate_db_path.clone(),
            max_connections: self.max_connections,
            busy_timeout_ms: self.effective_busy_timeout_ms(),
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: DatabaseSettings = toml::from_str("").unwrap();
        assert_eq!(settings, DatabaseSettings::default());
        assert_eq!(settings.database_wait_time_minutes, 15);
        assert_eq!(settings.repository_type().unwrap(), RepositoryType::Sqlite);
    }

    #[test]
    fn test_parse_local_config() {
        let settings: DatabaseSettings = toml::from_str(
            r#"
repository = "local"
busy_timeout_ms = 500
"#,
        )
        .unwrap();
        assert_eq!(settings.repository_type().unwrap(), RepositoryType::Local);
        assert_eq!(settings.effective_busy_timeout_ms(), 2000);
    }

    #[test]
    fn test_unknown_repository_type() {
        let settings = DatabaseSettings {
            repository: "postgres".to_string(),
            ..Default::default()
        };
        assert!(settings.repository_type().is_err());
    }
}
