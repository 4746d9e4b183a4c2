//! Time grid, score matrix and constraint masks.
//!
//! `S[b, t]` is the value of starting block `b` at slot `t`; zero forbids it.

use chrono::{DateTime, Duration, Utc};
use qtty::Degrees;
use rand::rngs::StdRng;
use rand::Rng;

use super::SchedulerError;
use crate::astro::{altitude, hour_angle_at, is_reachable};
use crate::models::{BlockConstraint, Period, SchedulingBlock, Site};

/// Slots of setup slack appended to every observation.
pub const PAD_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("block {0} has no observability window")]
    MissingWindow(String),
    #[error("score row for {name} has {found} slots, expected {expected}")]
    RowLength {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Uniform slots of `resolution` over a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeGrid {
    pub window: Period,
    pub resolution: Duration,
    pub len: usize,
}

impl TimeGrid {
    pub fn new(window: Period, resolution: Duration) -> Result<Self, SchedulerError> {
        if resolution <= Duration::zero() {
            return Err(SchedulerError::InvalidResolution(resolution));
        }
        let len = ceil_div(window.duration(), resolution);
        Ok(Self {
            window,
            resolution,
            len,
        })
    }

    pub fn time(&self, index: usize) -> DateTime<Utc> {
        self.window.start + self.resolution * index as i32
    }

    /// Slot containing `t`.
    pub fn index(&self, t: DateTime<Utc>) -> Option<usize> {
        if !self.window.contains(t) {
            return None;
        }
        let offset = (t - self.window.start).num_milliseconds();
        Some((offset / self.resolution.num_milliseconds()) as usize)
    }

    /// Slots needed to hold `d`, rounded up.
    pub fn slots_for(&self, d: Duration) -> usize {
        ceil_div(d, self.resolution)
    }

    /// Slots a block occupies including the setup pad.
    pub fn footprint(&self, d: Duration) -> usize {
        self.slots_for(d) + PAD_SLOTS
    }
}

fn ceil_div(d: Duration, step: Duration) -> usize {
    let d = d.num_milliseconds().max(0);
    let step = step.num_milliseconds().max(1);
    ((d + step - 1) / step) as usize
}

/// `|blocks| x |slots|` matrix, grown one row per materialized block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreMatrix {
    rows: Vec<Vec<f64>>,
}

impl ScoreMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, row: Vec<f64>) {
        self.rows.push(row);
    }

    /// Append a copy of row `b` multiplied by `factor`.
    pub fn push_scaled(&mut self, b: usize, factor: f64) {
        let row = self.rows[b].iter().map(|v| v * factor).collect();
        self.rows.push(row);
    }

    pub fn row(&self, b: usize) -> &[f64] {
        &self.rows[b]
    }

    /// Out-of-range entries are zero.
    pub fn get(&self, b: usize, t: usize) -> f64 {
        self.rows
            .get(b)
            .and_then(|row| row.get(t))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 1 inside `[start, end - duration]`, 0 elsewhere.
pub fn window_mask(grid: &TimeGrid, window: Period, duration: Duration) -> Vec<f64> {
    (0..grid.len)
        .map(|i| {
            let t = grid.time(i);
            if window.start <= t && t + duration <= window.end {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Falls linearly from 1 at `window.start` to 0 at `window.end`.
pub fn linear_decay(grid: &TimeGrid, window: Period) -> Vec<f64> {
    let span = window.duration().num_milliseconds() as f64;
    (0..grid.len)
        .map(|i| {
            let left = (window.end - grid.time(i)).num_milliseconds() as f64;
            (left / span).clamp(0.0, 1.0)
        })
        .collect()
}

/// Product of the masks of every constraint on `block`.
pub fn constraint_mask(block: &SchedulingBlock, grid: &TimeGrid, site: &Site) -> Vec<f64> {
    let mut mask = vec![1.0; grid.len];
    for constraint in &block.constraints {
        match constraint {
            BlockConstraint::Window(window) => {
                for (m, w) in mask.iter_mut().zip(window_mask(grid, *window, block.duration)) {
                    *m *= w;
                }
            }
            BlockConstraint::MinAltitude {
                limit_deg,
                ra_deg,
                dec_deg,
            } => {
                let ra = Degrees::new(*ra_deg);
                let dec = Degrees::new(*dec_deg);
                for (i, m) in mask.iter_mut().enumerate() {
                    if *m == 0.0 {
                        continue;
                    }
                    let t = grid.time(i);
                    let ok = is_reachable(hour_angle_at(site, ra, t), dec)
                        && altitude(site, ra, dec, t).value() >= *limit_deg;
                    if !ok {
                        *m = 0.0;
                    }
                }
            }
        }
    }
    mask
}

/// Multiply each entry by a uniform factor in `[1 - temperature, 1 + temperature]`.
pub fn perturb(row: &mut [f64], temperature: f64, rng: &mut StdRng) {
    if temperature <= 0.0 {
        return;
    }
    for v in row.iter_mut().filter(|v| **v != 0.0) {
        *v *= rng.gen_range(1.0 - temperature..=1.0 + temperature);
    }
}
