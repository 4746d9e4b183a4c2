//! External data sources consumed by the planner.
//!
//! The lifecycle manager and the scheduler only see the three traits below.
//! [`MpcClient`] talks to the Minor Planet Center; the [`fake`] module holds
//! in-memory versions for tests and offline runs.

use async_trait::async_trait;

pub mod error;
pub mod fake;
pub mod parsers;
pub mod types;

#[cfg(feature = "mpc-client")]
pub mod mpc;

pub use error::{ProviderError, ProviderResult};
pub use types::{EphemCadence, EphemerisRequest, EphemerisSample, FeedEntry};

#[cfg(feature = "mpc-client")]
pub use mpc::MpcClient;

/// Source of the current confirmation list.
#[async_trait]
pub trait CandidateFeed: Send + Sync {
    async fn list_candidates(&self) -> ProviderResult<Vec<FeedEntry>>;
}

/// Source of the raw uncertainty map text for one designation.
#[async_trait]
pub trait UncertaintyProvider: Send + Sync {
    async fn uncertainty(&self, designation: &str) -> ProviderResult<String>;
}

/// Source of time-sampled positions for moving targets.
#[async_trait]
pub trait EphemerisProvider: Send + Sync {
    /// One block of samples starting at `request.start`, in time order.
    async fn ephemeris(&self, request: &EphemerisRequest) -> ProviderResult<Vec<EphemerisSample>>;

    /// Time covered by one block at `cadence`, when the service has a fixed
    /// block length. Rows below the altitude limit are dropped from a block,
    /// so the samples alone can under-report its span.
    fn block_span(&self, _cadence: EphemCadence) -> Option<chrono::Duration> {
        None
    }
}
