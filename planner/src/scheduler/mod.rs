//! Nightly schedule construction.
//!
//! ```text
//! store snapshot ─► TypeRegistry::select ─► ephemeris prefetch
//!                                               │
//!                    blocks + score matrix ◄────┘
//!                               │
//!                   SchedulerEngine::run (greedy placement)
//!                               │
//!                   serializer::render ─► schedule text
//! ```
//!
//! [`planner::Planner`] is the async driver; everything below it is
//! synchronous and deterministic for a fixed seed.

use chrono::Duration;

use crate::astro::NightError;
use crate::db::RepositoryError;

pub mod engine;
pub mod planner;
pub mod registry;
pub mod scoring;
pub mod serializer;
pub mod transitions;

pub use engine::{EngineOptions, EngineOutcome, Placement, SchedulerEngine};
pub use planner::{PlanOutcome, Planner};
pub use registry::{MpcNeoConfig, SchedulingParams, TypeConfig, TypeRegistry};
pub use scoring::{ScoreMatrix, ScoringError, TimeGrid};
pub use serializer::{parse_schedule, render, ObservationLine, ScheduleLine, ScheduleParseError};
pub use transitions::TransitionTable;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("slot resolution must be positive, got {0}")]
    InvalidResolution(Duration),

    #[error("idle gap must be positive, got {0}")]
    InvalidGap(Duration),

    #[error("no scheduling configuration for type {0}")]
    UnknownType(String),

    #[error("cannot determine tonight's window: {0}")]
    Night(#[from] NightError),

    #[error("candidate store failed: {0}")]
    Store(#[from] RepositoryError),
}
