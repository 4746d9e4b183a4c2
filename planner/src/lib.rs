//! Nightly observation planner for near-Earth object confirmation targets.
//!
//! The crate keeps a catalog of candidates fed from the minor-planet
//! confirmation list ([`services::lifecycle`]), decides which of them are
//! worth observing tonight ([`services::observability`]) and assembles a
//! conflict-free observing schedule ([`scheduler`]).

pub mod astro;
pub mod config;
pub mod control;
pub mod db;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod services;

pub use config::{ConfigError, PlannerConfig};
