//! Per-type scheduling configuration.
//!
//! Candidates carry a `type` tag; the registry maps each tag to a
//! [`TypeConfig`] that selects candidates, scores their blocks, prices
//! transitions and writes their schedule lines.

use std::collections::HashMap;

use chrono::Duration;

use super::scoring::{linear_decay, window_mask, ScoringError, TimeGrid};
use super::serializer::{mpc_description, ObservationLine, ScheduleLine};
use super::transitions::TransitionTable;
use crate::config::{PlannerConfig, Thresholds};
use crate::models::{
    visit_name, BlockConstraint, Candidate, Period, ScheduleSlot, SchedulingBlock, MPC_NEO,
};

/// Cadence rules shared by every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingParams {
    pub max_minutes_without_focus: i64,
    pub num_obs: u32,
    pub min_minutes_between_obs: i64,
}

impl Default for SchedulingParams {
    fn default() -> Self {
        Self {
            max_minutes_without_focus: 65,
            num_obs: 2,
            min_minutes_between_obs: 45,
        }
    }
}

impl SchedulingParams {
    pub fn max_without_focus(&self) -> Duration {
        Duration::minutes(self.max_minutes_without_focus)
    }

    pub fn min_between_obs(&self) -> Duration {
        Duration::minutes(self.min_minutes_between_obs)
    }
}

/// Minor-planet confirmation targets.
#[derive(Debug, Clone, PartialEq)]
pub struct MpcNeoConfig {
    pub params: SchedulingParams,
    pub thresholds: Thresholds,
    pub filter: String,
    pub transitions: TransitionTable,
}

impl Default for MpcNeoConfig {
    fn default() -> Self {
        Self {
            params: SchedulingParams::default(),
            thresholds: Thresholds::default(),
            filter: "CLEAR".to_string(),
            transitions: TransitionTable::default(),
        }
    }
}

impl MpcNeoConfig {
    /// Candidates worth planning tonight.
    pub fn select<'a>(&self, candidates: &'a [Candidate], night: Period) -> Vec<&'a Candidate> {
        let th = &self.thresholds;
        candidates
            .iter()
            .filter(|c| c.candidate_type == MPC_NEO)
            .filter(|c| !c.is_removed() && !c.is_rejected())
            .filter(|c| {
                c.observability_window()
                    .is_some_and(|w| w.intersect(&night).is_some())
            })
            .filter(|c| c.exposure_duration().is_some() && c.ra.is_some())
            .filter(|c| c.score.unwrap_or(0.0) >= th.score_min)
            .filter(|c| c.n_obs.map_or(true, |n| n <= th.n_obs_max))
            .filter(|c| c.dec.is_some_and(|d| th.dec_min <= d && d <= th.dec_max))
            .collect()
    }

    /// First-visit block; `None` when the candidate cannot be planned.
    pub fn block(&self, candidate: &Candidate, night: Period) -> Option<SchedulingBlock> {
        let window = candidate.observability_window()?.intersect(&night)?;
        let duration = candidate.exposure_duration()?;
        let ra_deg = candidate.ra_degrees()?;
        let dec_deg = candidate.dec?;
        Some(SchedulingBlock::new(
            candidate.id.clone(),
            &candidate.candidate_type,
            &candidate.name,
            duration,
            vec![
                BlockConstraint::Window(window),
                BlockConstraint::MinAltitude {
                    limit_deg: self.thresholds.altitude_limit,
                    ra_deg,
                    dec_deg,
                },
            ],
            candidate.score.unwrap_or(0.0),
        ))
    }

    /// Window mask times a decay favouring the early part of the window.
    pub fn score_row(&self, block: &SchedulingBlock, grid: &TimeGrid) -> Result<Vec<f64>, ScoringError> {
        let window = block
            .window()
            .ok_or_else(|| ScoringError::MissingWindow(block.name.clone()))?;
        let mask = window_mask(grid, window, block.duration);
        let decay = linear_decay(grid, window);
        Ok(mask.iter().zip(decay).map(|(m, d)| m * d).collect())
    }

    pub fn emit_line(&self, slot: &ScheduleSlot, candidate: &Candidate, slew: bool) -> ScheduleLine {
        let ra_deg = candidate.ra_degrees().unwrap_or(0.0);
        let dec_deg = candidate.dec.unwrap_or(0.0);
        ScheduleLine::Observation(ObservationLine {
            datetime: slot.start,
            occupied: true,
            target: visit_name(&candidate.name, slot.visit_index),
            slew,
            ra_deg: round6(ra_deg),
            dec_deg: round6(dec_deg),
            exposure_time: candidate.exposure_time.unwrap_or(0.0),
            num_exposures: candidate.num_exposures.unwrap_or(0) as f64,
            filter: self.filter.clone(),
            description: mpc_description(
                &candidate.name,
                slot.start,
                ra_deg,
                dec_deg,
                candidate.d_ra,
                candidate.d_dec,
            ),
        })
    }
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// Scheduling behaviour of one candidate type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConfig {
    MpcNeo(MpcNeoConfig),
}

impl TypeConfig {
    pub fn tag(&self) -> &'static str {
        match self {
            TypeConfig::MpcNeo(_) => MPC_NEO,
        }
    }

    pub fn params(&self) -> SchedulingParams {
        match self {
            TypeConfig::MpcNeo(cfg) => cfg.params,
        }
    }

    pub fn select<'a>(&self, candidates: &'a [Candidate], night: Period) -> Vec<&'a Candidate> {
        match self {
            TypeConfig::MpcNeo(cfg) => cfg.select(candidates, night),
        }
    }

    pub fn block(&self, candidate: &Candidate, night: Period) -> Option<SchedulingBlock> {
        match self {
            TypeConfig::MpcNeo(cfg) => cfg.block(candidate, night),
        }
    }

    pub fn score_row(&self, block: &SchedulingBlock, grid: &TimeGrid) -> Result<Vec<f64>, ScoringError> {
        let row = match self {
            TypeConfig::MpcNeo(cfg) => cfg.score_row(block, grid)?,
        };
        if row.len() != grid.len {
            return Err(ScoringError::RowLength {
                name: block.name.clone(),
                expected: grid.len,
                found: row.len(),
            });
        }
        Ok(row)
    }

    pub fn transitions(&self) -> &TransitionTable {
        match self {
            TypeConfig::MpcNeo(cfg) => &cfg.transitions,
        }
    }

    pub fn emit_line(&self, slot: &ScheduleSlot, candidate: &Candidate, slew: bool) -> ScheduleLine {
        match self {
            TypeConfig::MpcNeo(cfg) => cfg.emit_line(slot, candidate, slew),
        }
    }
}

/// `type` tag to configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeRegistry {
    configs: HashMap<String, TypeConfig>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: TypeConfig) {
        self.configs.insert(config.tag().to_string(), config);
    }

    pub fn with(mut self, config: TypeConfig) -> Self {
        self.register(config);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&TypeConfig> {
        self.configs.get(tag)
    }

    /// Registered configurations in tag order.
    pub fn configs(&self) -> Vec<&TypeConfig> {
        let mut configs: Vec<_> = self.configs.values().collect();
        configs.sort_by_key(|c| c.tag());
        configs
    }

    /// Registry with every built-in type configured from `config`.
    pub fn from_config(config: &PlannerConfig) -> Self {
        let s = &config.scheduler;
        Self::new().with(TypeConfig::MpcNeo(MpcNeoConfig {
            params: SchedulingParams {
                max_minutes_without_focus: s.max_minutes_without_focus,
                num_obs: s.num_obs,
                min_minutes_between_obs: s.min_minutes_between_obs,
            },
            thresholds: config.thresholds.clone(),
            filter: s.filter.clone(),
            transitions: TransitionTable::from_settings(s.transition_seconds, &s.transitions),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RejectedReason;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, h, 0, 0).unwrap()
    }

    fn schedulable(name: &str) -> Candidate {
        let mut c = Candidate::new(name, MPC_NEO, "test", t(0));
        c.ra = Some(12.0);
        c.dec = Some(30.0);
        c.magnitude = Some(20.0);
        c.num_exposures = Some(1);
        c.exposure_time = Some(600.0);
        c.start_observability = Some(t(3));
        c.end_observability = Some(t(8));
        c
    }

    #[test]
    fn test_selection_filters() {
        let night = Period::new(t(2), t(11)).unwrap();
        let ok = schedulable("OK");
        let mut removed = schedulable("REMOVED");
        removed.removed_reason = Some("gone".into());
        let mut rejected = schedulable("REJECTED");
        rejected.rejected_reason = Some(RejectedReason::Rmse);
        let mut south = schedulable("SOUTH");
        south.dec = Some(-26.0);
        let mut no_exposure = schedulable("NOEXP");
        no_exposure.num_exposures = None;
        let mut outside = schedulable("OUTSIDE");
        outside.start_observability = Some(t(12));
        outside.end_observability = Some(t(13));
        let mut busy = schedulable("BUSY");
        busy.n_obs = Some(5000);

        let all = vec![ok, removed, rejected, south, no_exposure, outside, busy];
        let cfg = MpcNeoConfig::default();
        let names: Vec<_> = cfg.select(&all, night).iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["OK"]);
    }

    #[test]
    fn test_block_clipped_to_night() {
        let night = Period::new(t(4), t(11)).unwrap();
        let block = MpcNeoConfig::default()
            .block(&schedulable("A"), night)
            .unwrap();
        assert_eq!(block.window(), Period::new(t(4), t(8)));
        assert_eq!(block.duration, Duration::seconds(600));
        assert_eq!(block.name, "A_1");
    }

    #[test]
    fn test_score_row_zero_outside_window() {
        let night = Period::new(t(2), t(11)).unwrap();
        let cfg = MpcNeoConfig::default();
        let block = cfg.block(&schedulable("A"), night).unwrap();
        let grid = TimeGrid::new(night, Duration::minutes(30)).unwrap();
        let row = TypeConfig::MpcNeo(cfg).score_row(&block, &grid).unwrap();
        assert_eq!(row.len(), 18);
        assert_eq!(row[0], 0.0);
        assert_eq!(row[2], 1.0);
        assert!(row[3] < 1.0 && row[3] > 0.0);
        // 07:30 + 10 min still fits, 08:00 does not.
        assert!(row[11] > 0.0);
        assert_eq!(row[12], 0.0);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TypeRegistry::new().with(TypeConfig::MpcNeo(MpcNeoConfig::default()));
        assert!(registry.get(MPC_NEO).is_some());
        assert!(registry.get("Other").is_none());
        assert_eq!(registry.configs().len(), 1);
    }
}
