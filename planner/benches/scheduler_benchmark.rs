use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neo_planner::models::{BlockConstraint, CandidateId, Period, SchedulingBlock, Site, MPC_NEO};
use neo_planner::scheduler::{EngineOptions, MpcNeoConfig, SchedulerEngine, TypeConfig, TypeRegistry};

fn night() -> Period {
    let start = Utc.with_ymd_and_hms(2024, 10, 19, 3, 0, 0).unwrap();
    Period::new(start, start + Duration::hours(9)).unwrap()
}

fn blocks(n: usize, window: Period) -> Vec<SchedulingBlock> {
    (0..n)
        .map(|i| {
            let offset = Duration::minutes((i as i64 * 37) % 420);
            let own = Period::new(window.start + offset, window.end).unwrap();
            let name = format!("P21b{:03}", i);
            SchedulingBlock::new(
                CandidateId::from_raw(name.clone()),
                MPC_NEO,
                name,
                Duration::minutes(5 + (i as i64 % 3) * 5),
                vec![
                    BlockConstraint::Window(own),
                    BlockConstraint::MinAltitude {
                        limit_deg: 0.0,
                        ra_deg: (i as f64 * 23.0) % 360.0,
                        dec_deg: 10.0,
                    },
                ],
                1.0,
            )
        })
        .collect()
}

fn bench_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    let registry = TypeRegistry::new().with(TypeConfig::MpcNeo(MpcNeoConfig::default()));
    let site = Site::tmo();
    let window = night();

    for n in [10usize, 50, 200] {
        let input = blocks(n, window);
        group.bench_with_input(BenchmarkId::new("blocks", n), &input, |b, input| {
            b.iter(|| {
                let engine = SchedulerEngine::new(&registry, &site, EngineOptions::default());
                black_box(engine.run(window, input.clone()))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_placement);
criterion_main!(benches);
