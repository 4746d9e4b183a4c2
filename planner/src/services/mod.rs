//! Long-running planner services built on the store and the providers.

pub mod ephem_batch;
pub mod exposure;
pub mod lifecycle;
pub mod observability;

pub use ephem_batch::{EphemBatch, EphemBatchError, EphemBatchOptions, EphemBatchReport, EphemFormat};
pub use exposure::{exposure_for_magnitude, parse_uncertainty, Uncertainty, UncertaintyParseError};
pub use lifecycle::{
    CycleReport, IngestReport, LifecycleError, LifecycleManager, LifecycleOptions, SelectionReport,
    REMOVED_FROM_FEED,
};
pub use observability::{Observability, ObservabilityEngine, ObservabilityError};
