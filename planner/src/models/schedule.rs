//! Scheduling blocks and the slots of an assembled night.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::CandidateId;
use super::time::{serde_timestamp, Period};

/// What occupies a slot of the night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Observation,
    Focus,
    Transition,
    Idle,
}

/// One contiguous piece of the schedule. `candidate_id` is set for
/// observations only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    #[serde(with = "serde_timestamp")]
    pub start: DateTime<Utc>,
    #[serde(with = "serde_timestamp")]
    pub end: DateTime<Utc>,
    pub kind: SlotKind,
    pub candidate_id: Option<CandidateId>,
    /// 1-based visit number of an observation, 0 otherwise.
    pub visit_index: u32,
}

impl ScheduleSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, kind: SlotKind) -> Self {
        Self {
            start,
            end,
            kind,
            candidate_id: None,
            visit_index: 0,
        }
    }

    pub fn observation(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        candidate_id: CandidateId,
        visit_index: u32,
    ) -> Self {
        Self {
            start,
            end,
            kind: SlotKind::Observation,
            candidate_id: Some(candidate_id),
            visit_index,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &ScheduleSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Per-block placement constraint, turned into a score mask by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockConstraint {
    /// The whole observation must fall inside this window.
    Window(Period),
    /// A fixed position must stay at or above `limit_deg` and inside the
    /// mount envelope.
    MinAltitude {
        limit_deg: f64,
        ra_deg: f64,
        dec_deg: f64,
    },
}

/// Placement state; completion is only ever observed outside the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    Pending,
    Scheduled,
    Completed,
}

/// One visit of one candidate, ready for placement.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingBlock {
    pub candidate_id: CandidateId,
    /// Type tag selecting the scheduling configuration.
    pub candidate_type: String,
    /// Target name with the visit suffix, e.g. `P21abcd_2`.
    pub name: String,
    pub target: String,
    /// Exact open-shutter time of the visit.
    pub duration: Duration,
    pub constraints: Vec<BlockConstraint>,
    pub priority_hint: f64,
    pub visit_index: u32,
    pub state: BlockState,
}

impl SchedulingBlock {
    pub fn new(
        candidate_id: CandidateId,
        candidate_type: impl Into<String>,
        target: impl Into<String>,
        duration: Duration,
        constraints: Vec<BlockConstraint>,
        priority_hint: f64,
    ) -> Self {
        let target = target.into();
        Self {
            candidate_id,
            candidate_type: candidate_type.into(),
            name: visit_name(&target, 1),
            target,
            duration,
            constraints,
            priority_hint,
            visit_index: 1,
            state: BlockState::Pending,
        }
    }

    /// A fresh pending copy for the next visit.
    pub fn next_visit(&self) -> Self {
        let visit_index = self.visit_index + 1;
        Self {
            name: visit_name(&self.target, visit_index),
            visit_index,
            state: BlockState::Pending,
            ..self.clone()
        }
    }

    /// The observability window, if one is attached.
    pub fn window(&self) -> Option<Period> {
        self.constraints.iter().find_map(|c| match c {
            BlockConstraint::Window(p) => Some(*p),
            _ => None,
        })
    }
}

/// `<target>_<visit>` as written in the schedule.
pub fn visit_name(target: &str, visit_index: u32) -> String {
    format!("{}_{}", target, visit_index)
}

/// An assembled night: contiguous, sorted, non-overlapping slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub window: Period,
    pub slots: Vec<ScheduleSlot>,
}

impl Schedule {
    pub fn observations(&self) -> impl Iterator<Item = &ScheduleSlot> {
        self.slots
            .iter()
            .filter(|s| s.kind == SlotKind::Observation)
    }

    pub fn is_empty(&self) -> bool {
        self.observations().next().is_none()
    }

    /// Check that slots tile the window without gaps or overlaps.
    pub fn check_contiguous(&self) -> Result<(), String> {
        let mut cursor = self.window.start;
        for slot in &self.slots {
            if slot.start != cursor {
                return Err(format!("slot at {} does not start at {}", slot.start, cursor));
            }
            if slot.end <= slot.start {
                return Err(format!("empty slot at {}", slot.start));
            }
            cursor = slot.end;
        }
        if cursor != self.window.end {
            return Err(format!("schedule ends at {} instead of {}", cursor, self.window.end));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_visit_carries_suffix() {
        let block = SchedulingBlock::new(
            CandidateId::from_raw("x"),
            "MPC-NEO",
            "P21abcd",
            Duration::seconds(600),
            vec![],
            1.0,
        );
        assert_eq!(block.name, "P21abcd_1");
        let second = block.next_visit();
        assert_eq!(second.name, "P21abcd_2");
        assert_eq!(second.visit_index, 2);
        assert_eq!(second.duration, block.duration);
    }

    #[test]
    fn test_contiguity_check() {
        let t = |m| Utc.with_ymd_and_hms(2024, 10, 19, 4, m, 0).unwrap();
        let window = Period::new(t(0), t(30)).unwrap();
        let schedule = Schedule {
            window,
            slots: vec![
                ScheduleSlot::new(t(0), t(10), SlotKind::Idle),
                ScheduleSlot::new(t(10), t(30), SlotKind::Focus),
            ],
        };
        assert!(schedule.check_contiguous().is_ok());
        assert!(schedule.is_empty());

        let broken = Schedule {
            window,
            slots: vec![ScheduleSlot::new(t(0), t(10), SlotKind::Idle)],
        };
        assert!(broken.check_contiguous().is_err());
    }
}
