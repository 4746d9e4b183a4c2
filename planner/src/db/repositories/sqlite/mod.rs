//! SQLite repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - WAL journal and a `busy_timeout` pragma on every pooled connection
//! - One retry for transient failures (busy, dropped connection)
//! - Automatic migration execution
//!
//! Every mutation is a read-merge-validate-write inside an immediate
//! transaction, so field-wise merges from concurrent writers never interleave.

use async_trait::async_trait;
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sql_query;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task;

use crate::db::repository::*;
use crate::models::{format_timestamp, Candidate, CandidateField, CandidateId, CandidateUpdate};

mod models;
mod schema;

use models::CandidateRow;
use schema::candidates;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Lower bound for the SQLite busy wait.
pub const MIN_BUSY_TIMEOUT_MS: u64 = 2000;

/// Configuration for the SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path of the database file
    pub database_path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long a writer waits for the file lock before `Busy`
    pub busy_timeout_ms: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Delay before the retry in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("candidates.db"),
            max_connections: 4,
            busy_timeout_ms: MIN_BUSY_TIMEOUT_MS,
            max_retries: 1,
            retry_delay_ms: 100,
        }
    }
}

impl SqliteConfig {
    /// Create configuration for a database file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Default::default()
        }
    }
}

/// Applies the per-connection pragmas when r2d2 hands out a connection.
#[derive(Debug)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Diesel-backed candidate store on a SQLite file.
#[derive(Clone, Debug)]
pub struct SqliteRepository {
    pool: SqlitePool,
    config: SqliteConfig,
}

impl SqliteRepository {
    /// Open (or create) the database and run pending migrations.
    pub fn new(mut config: SqliteConfig) -> RepositoryResult<Self> {
        config.busy_timeout_ms = config.busy_timeout_ms.max(MIN_BUSY_TIMEOUT_MS);
        let url = config.database_path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);

        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .connection_timeout(Duration::from_millis(config.busy_timeout_ms * 2))
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| {
                RepositoryError::ConfigurationError {
                    message: e.to_string(),
                    context: ErrorContext::new("create_pool").with_details(format!(
                        "path={}",
                        config.database_path.display()
                    )),
                }
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        log::info!(
            "Opened candidate store at {}",
            config.database_path.display()
        );
        Ok(Self { pool, config })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut SqliteConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;
        Ok(())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Execute a database operation, retrying transient failures.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

        task::spawn_blocking(move || {
            let mut last_error = None;

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    std::thread::sleep(retry_delay);
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        log::debug!("Retrying store operation after: {}", e);
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Load, merge and write back one record inside an immediate transaction.
    async fn mutate<M>(
        &self,
        operation: &'static str,
        id: &CandidateId,
        merge: M,
    ) -> RepositoryResult<Candidate>
    where
        M: Fn(&Candidate) -> RepositoryResult<Option<Candidate>> + Send + Sync + Clone + 'static,
    {
        let id = id.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|tx| {
                let row = candidates::table
                    .find(id.as_str())
                    .select(CandidateRow::as_select())
                    .first::<CandidateRow>(tx)
                    .optional()?
                    .ok_or_else(|| {
                        RepositoryError::not_found_with_context(
                            format!("Candidate {} not found", id),
                            ErrorContext::new(operation)
                                .with_entity("candidate")
                                .with_entity_id(&id),
                        )
                    })?;
                let current = Candidate::try_from(row)?;
                match merge(&current)? {
                    Some(next) => {
                        diesel::update(candidates::table.find(id.as_str()))
                            .set(&CandidateRow::from(&next))
                            .execute(tx)?;
                        Ok(next)
                    }
                    None => Ok(current),
                }
            })
        })
        .await
        .map_err(|e| e.with_operation(operation))
    }
}

#[async_trait]
impl CandidateRepository for SqliteRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn insert(&self, candidate: &Candidate) -> RepositoryResult<CandidateId> {
        let record = prepare_insert(candidate, Utc::now())?;
        let row = CandidateRow::from(&record);
        let id = record.id.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|tx| {
                let exists = candidates::table
                    .find(row.id.as_str())
                    .count()
                    .get_result::<i64>(tx)?
                    > 0;
                if exists {
                    return Err(RepositoryError::already_exists_with_context(
                        format!("Candidate {} already stored", row.name),
                        ErrorContext::new("insert")
                            .with_entity("candidate")
                            .with_entity_id(&row.id),
                    ));
                }
                diesel::insert_into(candidates::table)
                    .values(&row)
                    .execute(tx)?;
                Ok(())
            })
        })
        .await?;
        Ok(id)
    }

    async fn get(&self, id: &CandidateId) -> RepositoryResult<Option<Candidate>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            candidates::table
                .find(id.as_str())
                .select(CandidateRow::as_select())
                .first::<CandidateRow>(conn)
                .optional()?
                .map(Candidate::try_from)
                .transpose()
        })
        .await
    }

    async fn update(
        &self,
        id: &CandidateId,
        update: &CandidateUpdate,
    ) -> RepositoryResult<Candidate> {
        let update = update.clone();
        self.mutate("update", id, move |current| {
            merge_update(current, &update, Utc::now()).map(Some)
        })
        .await
    }

    async fn set_null(
        &self,
        id: &CandidateId,
        field: CandidateField,
    ) -> RepositoryResult<Candidate> {
        self.mutate("set_null", id, move |current| {
            merge_null(current, field, Utc::now()).map(Some)
        })
        .await
    }

    async fn query(&self, query: &CandidateQuery) -> RepositoryResult<Vec<Candidate>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut sql = candidates::table
                .select(CandidateRow::as_select())
                .into_boxed();
            if let Some(ref t) = query.candidate_type {
                sql = sql.filter(candidates::candidate_type.eq(t.clone()));
            }
            if query.exclude_removed {
                sql = sql.filter(candidates::removed_reason.is_null());
            }
            if query.exclude_rejected {
                sql = sql.filter(candidates::rejected_reason.is_null());
            }
            if let Some(since) = query.added_since {
                // Canonical timestamps sort lexicographically.
                sql = sql.filter(candidates::date_added.ge(format_timestamp(&since)));
            }
            if let Some(limit) = query.limit {
                sql = sql.limit(limit as i64);
            }
            let rows = sql
                .order((candidates::date_added.asc(), candidates::id.asc()))
                .load::<CandidateRow>(conn)?;
            rows.into_iter().map(Candidate::try_from).collect()
        })
        .await
    }

    async fn remove(&self, id: &CandidateId, reason: &str) -> RepositoryResult<Candidate> {
        let reason = reason.to_string();
        self.mutate("remove", id, move |current| {
            Ok(mark_removed(current, &reason, Utc::now()))
        })
        .await
    }

    async fn count(&self) -> RepositoryResult<usize> {
        self.with_conn(|conn| {
            let n = candidates::table.count().get_result::<i64>(conn)?;
            Ok(n as usize)
        })
        .await
    }
}
