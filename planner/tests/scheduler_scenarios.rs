//! End-to-end planning scenarios on fixed nights.

mod support;

use std::sync::Arc;

use chrono::Duration;
use neo_planner::db::{CandidateRepository, LocalRepository};
use neo_planner::models::{
    BlockConstraint, CandidateId, Period, SchedulingBlock, Site, SlotKind, MPC_NEO,
};
use neo_planner::scheduler::{
    parse_schedule, EngineOptions, MpcNeoConfig, Planner, ScheduleLine, SchedulerEngine,
    SchedulingParams, TypeConfig, TypeRegistry,
};
use neo_planner::services::ObservabilityEngine;

use support::*;

fn registry() -> TypeRegistry {
    TypeRegistry::new().with(TypeConfig::MpcNeo(MpcNeoConfig::default()))
}

fn params() -> SchedulingParams {
    SchedulingParams::default()
}

#[tokio::test]
async fn test_single_candidate_gets_two_spaced_visits() {
    let window = Period::new(utc(2024, 7, 19, 20, 0), utc(2024, 7, 20, 4, 0)).unwrap();
    let repo = Arc::new(LocalRepository::new());
    repo.insert(&ready_candidate("P21sone", 12.0, 30.0, window))
        .await
        .unwrap();

    let planner = Planner::new(repo, registry(), Site::tmo());
    let outcome = planner.plan_window(window).await.unwrap();
    let schedule = &outcome.engine.schedule;

    let obs: Vec<_> = schedule.observations().collect();
    assert_eq!(obs.len(), 2);
    for slot in &obs {
        assert_eq!(slot.duration(), Duration::seconds(600));
        assert!(window.start <= slot.start && slot.end <= window.end);
    }
    assert!(obs[1].start - obs[0].start >= Duration::minutes(45));
    assert_schedule_invariants(schedule, params().min_between_obs(), params().max_without_focus());

    assert!(matches!(outcome.lines[0], ScheduleLine::Focus { .. }));
    let targets: Vec<_> = outcome
        .lines
        .iter()
        .filter_map(|l| match l {
            ScheduleLine::Observation(o) => Some((o.target.as_str(), o.slew)),
            ScheduleLine::Focus { .. } => None,
        })
        .collect();
    assert_eq!(targets, vec![("P21sone_1", true), ("P21sone_2", false)]);

    assert_eq!(parse_schedule(&outcome.text).unwrap(), outcome.lines);
}

#[test]
fn test_southern_candidate_window_inside_night() {
    let night = Period::new(utc(2024, 10, 19, 2, 0), utc(2024, 10, 19, 11, 0)).unwrap();
    let engine = ObservabilityEngine::new(Site::tmo(), 0.0);

    let window = engine.sidereal_window(45.0, -30.0, night).unwrap();
    assert!(night.covers(&window));
    assert!(window.start > night.start);
    assert_eq!(window.end, night.end);
    assert!(engine.is_observable(45.0, -30.0, window.start + Duration::minutes(1)));
}

fn overlapping_blocks(window: Period) -> Vec<SchedulingBlock> {
    ["P21aaaa", "P21bbbb", "P21cccc"]
        .into_iter()
        .map(|name| {
            SchedulingBlock::new(
                CandidateId::from_raw(name),
                MPC_NEO,
                name,
                Duration::minutes(10),
                vec![BlockConstraint::Window(window)],
                1.0,
            )
        })
        .collect()
}

#[test]
fn test_equal_priority_blocks_place_greedily() {
    let t0 = utc(2024, 10, 19, 4, 0);
    let window = Period::new(t0, t0 + Duration::hours(2)).unwrap();
    let registry = registry();
    let site = Site::tmo();

    let outcome = SchedulerEngine::new(&registry, &site, EngineOptions::default())
        .run(window, overlapping_blocks(window))
        .unwrap();

    let placed: Vec<_> = outcome
        .placements
        .iter()
        .map(|p| {
            (
                outcome.blocks[p.block].name.as_str(),
                (p.start - t0).num_minutes(),
            )
        })
        .collect();
    assert_eq!(
        placed,
        vec![
            ("P21aaaa_1", 5),
            ("P21bbbb_1", 17),
            ("P21cccc_1", 29),
            ("P21aaaa_2", 50),
            ("P21bbbb_2", 62),
            ("P21cccc_2", 79),
        ]
    );

    let focus: Vec<_> = outcome
        .schedule
        .slots
        .iter()
        .filter(|s| s.kind == SlotKind::Focus)
        .map(|s| (s.start - t0).num_minutes())
        .collect();
    // The opening focus, then one more once 65 minutes have passed.
    assert_eq!(focus, vec![0, 74]);
    assert!(outcome.placements[5].focus_before);

    assert_schedule_invariants(&outcome.schedule, params().min_between_obs(), params().max_without_focus());
}

#[test]
fn test_schedule_is_reproducible() {
    let t0 = utc(2024, 10, 19, 4, 0);
    let window = Period::new(t0, t0 + Duration::hours(2)).unwrap();
    let registry = registry();
    let site = Site::tmo();

    let warm = EngineOptions {
        temperature: 0.3,
        seed: 7,
        ..EngineOptions::default()
    };
    for options in [EngineOptions::default(), warm] {
        let engine = SchedulerEngine::new(&registry, &site, options);
        let a = engine.run(window, overlapping_blocks(window)).unwrap();
        let b = engine.run(window, overlapping_blocks(window)).unwrap();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn test_empty_night_renders_diagnostic() {
    let repo = Arc::new(LocalRepository::new());
    let planner = Planner::new(repo, registry(), Site::tmo());
    let outcome = planner.plan_window(night()).await.unwrap();

    assert!(outcome.is_empty());
    let body: Vec<_> = outcome.text.lines().skip(1).collect();
    assert_eq!(body.len(), 1);
    assert!(body[0].starts_with("# no observable candidates"));
    assert!(parse_schedule(&outcome.text).unwrap().is_empty());
}

#[tokio::test]
async fn test_rendering_twice_is_byte_identical() {
    let repo = Arc::new(LocalRepository::new());
    for (name, ra) in [("P21xone", 2.5), ("P21xtwo", 3.0), ("P21xthr", 3.5)] {
        repo.insert(&ready_candidate(name, ra, 10.0, night()))
            .await
            .unwrap();
    }
    let planner = Planner::new(repo, registry(), Site::tmo());

    let first = planner.plan_window(night()).await.unwrap();
    let second = planner.plan_window(night()).await.unwrap();
    assert_eq!(first.text, second.text);
    assert!(!first.is_empty());
    assert_schedule_invariants(
        &first.engine.schedule,
        params().min_between_obs(),
        params().max_without_focus(),
    );
}
