//! Time-slotted greedy placement.
//!
//! At each step every pending block is tried at the current time, behind an
//! optional prefix (a transition, or a focus run when the focus cadence has
//! lapsed). The best-scoring feasible block is committed; ties go to the
//! lowest block index. Nothing feasible advances time by the gap.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::registry::{TypeConfig, TypeRegistry};
use super::scoring::{constraint_mask, perturb, ScoreMatrix, TimeGrid};
use super::SchedulerError;
use crate::models::{BlockState, Period, Schedule, ScheduleSlot, SchedulingBlock, Site, SlotKind};

/// Length of a focus run.
pub const FOCUS_SECONDS: i64 = 300;

/// Score factor applied when a focus run must precede the block.
pub const FOCUS_PENALTY: f64 = 0.8;

/// Score factor of a repeat visit relative to its parent row.
pub const REPEAT_BOOST: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Slot resolution Δ
    pub resolution: Duration,
    /// Time skipped when nothing fits
    pub gap: Duration,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            resolution: Duration::seconds(60),
            gap: Duration::minutes(1),
            temperature: 0.0,
            seed: 0,
        }
    }
}

/// One committed observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Index into [`EngineOutcome::blocks`]
    pub block: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub focus_before: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    pub schedule: Schedule,
    /// Every block, including materialized repeat visits, with final states.
    pub blocks: Vec<SchedulingBlock>,
    pub scores: ScoreMatrix,
    pub placements: Vec<Placement>,
}

/// What must run before a block at the current time.
#[derive(Debug, Clone, Copy)]
struct Staged {
    block: usize,
    score: f64,
    focus: bool,
    prefix: Duration,
    start: DateTime<Utc>,
}

pub struct SchedulerEngine<'a> {
    registry: &'a TypeRegistry,
    site: &'a Site,
    options: EngineOptions,
}

impl<'a> SchedulerEngine<'a> {
    pub fn new(registry: &'a TypeRegistry, site: &'a Site, options: EngineOptions) -> Self {
        Self {
            registry,
            site,
            options,
        }
    }

    /// Composite row: type score times constraint masks, then perturbed.
    ///
    /// A failing type scorer falls back to the masks alone.
    fn score_row(
        &self,
        config: &TypeConfig,
        block: &SchedulingBlock,
        grid: &TimeGrid,
        rng: &mut StdRng,
    ) -> Vec<f64> {
        let mask = constraint_mask(block, grid, self.site);
        let mut row = match config.score_row(block, grid) {
            Ok(base) => base.iter().zip(&mask).map(|(s, m)| s * m).collect(),
            Err(e) => {
                log::warn!("Scorer failed for {}, using constraint masks: {}", block.name, e);
                mask
            }
        };
        perturb(&mut row, self.options.temperature, rng);
        row
    }

    /// Place `blocks` over `window`.
    pub fn run(
        &self,
        window: Period,
        blocks: Vec<SchedulingBlock>,
    ) -> Result<EngineOutcome, SchedulerError> {
        if self.options.gap <= Duration::zero() {
            return Err(SchedulerError::InvalidGap(self.options.gap));
        }
        let grid = TimeGrid::new(window, self.options.resolution)?;
        let mut rng = StdRng::seed_from_u64(self.options.seed);

        let mut blocks: Vec<SchedulingBlock> = blocks
            .into_iter()
            .filter(|b| {
                let known = self.registry.get(&b.candidate_type).is_some();
                if !known {
                    log::warn!("No scheduling configuration for type {}; skipping {}", b.candidate_type, b.name);
                }
                known
            })
            .collect();

        let mut scores = ScoreMatrix::new();
        for block in &blocks {
            let config = self.config(block)?;
            scores.push_row(self.score_row(config, block, &grid, &mut rng));
        }

        let mut slots: Vec<ScheduleSlot> = Vec::new();
        let mut placements: Vec<Placement> = Vec::new();
        let mut last_start: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut visits: HashMap<String, u32> = HashMap::new();
        let mut last_focus: Option<DateTime<Utc>> = None;
        let mut current = window.start;

        while current < window.end {
            let previous_target = placements.last().map(|p| blocks[p.block].target.as_str());
            let mut best: Option<Staged> = None;

            for (b, block) in blocks.iter().enumerate() {
                if block.state != BlockState::Pending {
                    continue;
                }
                let config = self.config(block)?;
                let params = config.params();

                let transition = config.transitions().lookup(previous_target, &block.target);
                let focus = last_focus.map_or(true, |f| current - f > params.max_without_focus());
                let prefix = if focus {
                    Duration::seconds(FOCUS_SECONDS)
                } else {
                    transition
                };

                let start = current + prefix;
                let occupied = grid.resolution * grid.footprint(block.duration) as i32;
                if start + occupied > window.end {
                    continue;
                }
                let Some(first) = grid.index(start) else {
                    continue;
                };
                let span = grid.slots_for(block.duration);
                if (first..first + span).any(|i| scores.get(b, i) == 0.0) {
                    continue;
                }
                if let Some(prev) = last_start.get(&block.target) {
                    if start - *prev < params.min_between_obs() {
                        continue;
                    }
                }

                let score = scores.get(b, first) * if focus { FOCUS_PENALTY } else { 1.0 };
                if best.map_or(true, |s| score > s.score) {
                    best = Some(Staged {
                        block: b,
                        score,
                        focus,
                        prefix,
                        start,
                    });
                }
            }

            let Some(staged) = best else {
                let next = (current + self.options.gap).min(window.end);
                push_slot(&mut slots, ScheduleSlot::new(current, next, SlotKind::Idle));
                current = next;
                continue;
            };

            if staged.prefix > Duration::zero() {
                let kind = if staged.focus {
                    SlotKind::Focus
                } else {
                    SlotKind::Transition
                };
                push_slot(&mut slots, ScheduleSlot::new(current, staged.start, kind));
            }
            if staged.focus {
                last_focus = Some(staged.start);
            }

            let block = &mut blocks[staged.block];
            let end = staged.start + block.duration;
            let padded_end =
                staged.start + grid.resolution * grid.footprint(block.duration) as i32;
            push_slot(
                &mut slots,
                ScheduleSlot::observation(
                    staged.start,
                    end,
                    block.candidate_id.clone(),
                    block.visit_index,
                ),
            );
            if padded_end > end {
                push_slot(&mut slots, ScheduleSlot::new(end, padded_end, SlotKind::Idle));
            }
            block.state = BlockState::Scheduled;
            log::debug!(
                "Scheduled {} at {} (score {:.4}{})",
                block.name,
                staged.start,
                staged.score,
                if staged.focus { ", after focus" } else { "" }
            );

            let target = block.target.clone();
            last_start.insert(target.clone(), staged.start);
            let done = visits.entry(target).or_insert(0);
            *done += 1;

            let params = self.config(block)?.params();
            if *done < params.num_obs {
                let next_visit = block.next_visit();
                blocks.push(next_visit);
                scores.push_scaled(staged.block, REPEAT_BOOST);
            }

            placements.push(Placement {
                block: staged.block,
                start: staged.start,
                end,
                focus_before: staged.focus,
            });
            current = padded_end;
        }

        Ok(EngineOutcome {
            schedule: Schedule { window, slots },
            blocks,
            scores,
            placements,
        })
    }

    fn config(&self, block: &SchedulingBlock) -> Result<&'a TypeConfig, SchedulerError> {
        self.registry
            .get(&block.candidate_type)
            .ok_or_else(|| SchedulerError::UnknownType(block.candidate_type.clone()))
    }
}

/// Append a slot, merging consecutive idle time.
fn push_slot(slots: &mut Vec<ScheduleSlot>, slot: ScheduleSlot) {
    if slot.end <= slot.start {
        return;
    }
    if slot.kind == SlotKind::Idle {
        if let Some(last) = slots.last_mut() {
            if last.kind == SlotKind::Idle && last.end == slot.start {
                last.end = slot.end;
                return;
            }
        }
    }
    slots.push(slot);
}
