//! Repository implementations.

pub mod local;
#[cfg(feature = "sqlite-repo")]
pub mod sqlite;

pub use local::LocalRepository;
#[cfg(feature = "sqlite-repo")]
pub use sqlite::{SqliteConfig, SqliteRepository};
