//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use neo_planner::config::Thresholds;
use neo_planner::db::{CandidateRepository, LocalRepository};
use neo_planner::models::{Candidate, Period, Schedule, Site, SlotKind, MPC_NEO};
use neo_planner::providers::fake::{StaticFeed, StaticUncertainty};
use neo_planner::providers::FeedEntry;
use neo_planner::services::{LifecycleManager, LifecycleOptions, ObservabilityEngine};

pub const AUTHOR: &str = "neo-planner";

/// A quiet uncertainty map: small offsets, no approach markers.
pub const QUIET_MAP: &str = "Offsets\n  1  2\n  2  1\n -1 -2\n";

/// A map whose offsets exceed the default RMS limits.
pub const WIDE_MAP: &str = "  90  80\n -70 -95\n";

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Night of 2024-10-19 at TMO, clipped like the observing window.
pub fn night() -> Period {
    Period::new(utc(2024, 10, 19, 2, 0), utc(2024, 10, 19, 11, 0)).unwrap()
}

/// Cycle time just before `night()`.
pub fn cycle_now() -> DateTime<Utc> {
    utc(2024, 10, 19, 1, 0)
}

pub fn entry(name: &str, ra_hours: f64, dec: f64, vmag: f64) -> FeedEntry {
    let mut e = FeedEntry::new(name);
    e.ra = Some(ra_hours);
    e.dec = Some(dec);
    e.vmag = Some(vmag);
    e.score = Some(90.0);
    e.num_obs = Some(5);
    e
}

/// A stored, schedulable MPC-NEO candidate.
pub fn ready_candidate(name: &str, ra_hours: f64, dec: f64, window: Period) -> Candidate {
    let mut c = Candidate::new(name, MPC_NEO, AUTHOR, window.start - chrono::Duration::hours(1));
    c.ra = Some(ra_hours);
    c.dec = Some(dec);
    c.magnitude = Some(20.0);
    c.num_exposures = Some(1);
    c.exposure_time = Some(600.0);
    c.rmse_ra = Some(5.0);
    c.rmse_dec = Some(5.0);
    c.start_observability = Some(window.start);
    c.end_observability = Some(window.end);
    c
}

pub fn options() -> LifecycleOptions {
    LifecycleOptions {
        author: AUTHOR.to_string(),
        request_timeout: StdDuration::from_secs(5),
        cycle_deadline: StdDuration::from_secs(30),
        thresholds: Thresholds::default(),
        ..LifecycleOptions::default()
    }
}

pub struct Harness {
    pub repo: Arc<LocalRepository>,
    pub feed: Arc<StaticFeed>,
    pub uncertainty: Arc<StaticUncertainty>,
    pub manager: LifecycleManager,
}

/// Lifecycle manager on the sidereal path with in-memory collaborators.
pub fn harness(feed: StaticFeed, uncertainty: StaticUncertainty) -> Harness {
    let repo = Arc::new(LocalRepository::new());
    let feed = Arc::new(feed);
    let uncertainty = Arc::new(uncertainty);
    let manager = LifecycleManager::new(
        repo.clone() as Arc<dyn CandidateRepository>,
        feed.clone(),
        uncertainty.clone(),
        ObservabilityEngine::new(Site::tmo(), 0.0),
        options(),
    );
    Harness {
        repo,
        feed,
        uncertainty,
        manager,
    }
}

/// Observation slots must be spaced, focused and non-overlapping.
pub fn assert_schedule_invariants(
    schedule: &Schedule,
    min_between: chrono::Duration,
    max_without_focus: chrono::Duration,
) {
    schedule.check_contiguous().unwrap();

    for (i, a) in schedule.slots.iter().enumerate() {
        for b in &schedule.slots[i + 1..] {
            assert!(a.end <= b.start || b.end <= a.start, "{:?} overlaps {:?}", a, b);
        }
    }

    let obs: Vec<_> = schedule.observations().collect();
    for (i, a) in obs.iter().enumerate() {
        for b in &obs[i + 1..] {
            if a.candidate_id == b.candidate_id {
                assert!(b.start - a.start >= min_between, "{:?} too close to {:?}", b, a);
            }
        }
    }

    let mut last_focus = None;
    for slot in &schedule.slots {
        match slot.kind {
            SlotKind::Focus => last_focus = Some(slot.end),
            SlotKind::Observation => {
                let focus = last_focus.expect("observation before any focus");
                assert!(slot.start - focus <= max_without_focus, "{:?} missed a focus", slot);
            }
            _ => {}
        }
    }
}
