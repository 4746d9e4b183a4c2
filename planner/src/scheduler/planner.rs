//! Async planning driver: store snapshot to schedule text.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use super::engine::{EngineOptions, EngineOutcome, SchedulerEngine};
use super::registry::TypeRegistry;
use super::serializer::{render, ScheduleLine};
use super::SchedulerError;
use crate::astro::NightWindow;
use crate::config::{ConfigError, PlannerConfig};
use crate::db::{CandidateQuery, CandidateRepository};
use crate::models::{format_timestamp, Candidate, CandidateId, Period, Site, SlotKind};
use crate::providers::{EphemCadence, EphemerisProvider, EphemerisRequest, ProviderError};

/// Result of planning one window.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub window: Period,
    /// Candidates that produced blocks, with prefetched positions applied.
    pub selected: Vec<Candidate>,
    pub engine: EngineOutcome,
    pub lines: Vec<ScheduleLine>,
    /// Rendered schedule file.
    pub text: String,
}

impl PlanOutcome {
    /// True when no observation was placed.
    pub fn is_empty(&self) -> bool {
        self.engine.schedule.is_empty()
    }
}

pub struct Planner {
    repo: Arc<dyn CandidateRepository>,
    ephemeris: Option<Arc<dyn EphemerisProvider>>,
    registry: TypeRegistry,
    site: Site,
    options: EngineOptions,
    cadence: EphemCadence,
    altitude_limit: f64,
    max_concurrent: usize,
}

impl Planner {
    pub fn new(repo: Arc<dyn CandidateRepository>, registry: TypeRegistry, site: Site) -> Self {
        Self {
            repo,
            ephemeris: None,
            registry,
            site,
            options: EngineOptions::default(),
            cadence: EphemCadence::OneMinute,
            altitude_limit: 0.0,
            max_concurrent: 8,
        }
    }

    /// Planner wired from the configuration file.
    pub fn from_config(
        repo: Arc<dyn CandidateRepository>,
        config: &PlannerConfig,
    ) -> Result<Self, ConfigError> {
        let s = &config.scheduler;
        let mut planner = Self::new(repo, TypeRegistry::from_config(config), config.site()?)
            .with_options(EngineOptions {
                resolution: chrono::Duration::seconds(s.resolution_seconds as i64),
                gap: chrono::Duration::minutes(s.gap_minutes as i64),
                temperature: s.temperature,
                seed: s.seed.unwrap_or(0),
            });
        planner.cadence = config.ephemeris.cadence()?;
        planner.altitude_limit = config.thresholds.altitude_limit;
        planner.max_concurrent = config.lifecycle.max_concurrent_requests.max(1);
        Ok(planner)
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Refresh positions of moving targets before placement.
    pub fn with_ephemeris(mut self, provider: Arc<dyn EphemerisProvider>, cadence: EphemCadence) -> Self {
        self.ephemeris = Some(provider);
        self.cadence = cadence;
        self
    }

    /// Plan tonight's observing window as seen from `now`.
    pub async fn plan_night(&self, now: DateTime<Utc>) -> Result<PlanOutcome, SchedulerError> {
        let window = NightWindow::around(&self.site, now)?.observing_window()?;
        self.plan_window(window).await
    }

    pub async fn plan_window(&self, window: Period) -> Result<PlanOutcome, SchedulerError> {
        let snapshot = self
            .repo
            .query(&CandidateQuery::new().not_removed().not_rejected())
            .await?;

        let mut selected: Vec<Candidate> = Vec::new();
        for config in self.registry.configs() {
            selected.extend(config.select(&snapshot, window).into_iter().cloned());
        }
        log::info!(
            "Planning {} -> {}: {} of {} candidates selected",
            format_timestamp(&window.start),
            format_timestamp(&window.end),
            selected.len(),
            snapshot.len()
        );

        let selected = self.prefetch(selected, window).await;

        let blocks = selected
            .iter()
            .filter_map(|c| self.registry.get(&c.candidate_type)?.block(c, window))
            .collect();

        let engine = SchedulerEngine::new(&self.registry, &self.site, self.options)
            .run(window, blocks)?;

        let by_id: HashMap<&CandidateId, &Candidate> = selected.iter().map(|c| (&c.id, c)).collect();
        let mut lines = Vec::new();
        let mut previous: Option<&str> = None;
        for slot in &engine.schedule.slots {
            match slot.kind {
                SlotKind::Focus => lines.push(ScheduleLine::Focus {
                    datetime: slot.start,
                }),
                SlotKind::Observation => {
                    let Some(candidate) = slot.candidate_id.as_ref().and_then(|id| by_id.get(id)) else {
                        continue;
                    };
                    let Some(config) = self.registry.get(&candidate.candidate_type) else {
                        continue;
                    };
                    let slew = previous != Some(candidate.name.as_str());
                    lines.push(config.emit_line(slot, candidate, slew));
                    previous = Some(candidate.name.as_str());
                }
                SlotKind::Transition | SlotKind::Idle => {}
            }
        }

        let diagnostic = format!(
            "no observable candidates between {} and {}",
            format_timestamp(&window.start),
            format_timestamp(&window.end)
        );
        let text = render(&lines, &diagnostic);
        log::info!(
            "Scheduled {} observations from {} blocks",
            engine.placements.len(),
            engine.blocks.len()
        );

        Ok(PlanOutcome {
            window,
            selected,
            engine,
            lines,
            text,
        })
    }

    /// Fetch positions at the window start; a failed fetch drops the candidate.
    async fn prefetch(&self, candidates: Vec<Candidate>, window: Period) -> Vec<Candidate> {
        let Some(provider) = &self.ephemeris else {
            return candidates;
        };

        let mut refreshed: Vec<(usize, Candidate)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, mut candidate)| {
                let provider = Arc::clone(provider);
                let request = EphemerisRequest {
                    designation: candidate.name.clone(),
                    start: window.start,
                    cadence: self.cadence,
                    altitude_limit: self.altitude_limit,
                    obs_code: self.site.obs_code.clone(),
                };
                async move {
                    match provider.ephemeris(&request).await {
                        Ok(samples) => {
                            let sample = samples
                                .iter()
                                .find(|s| s.time >= window.start)
                                .or(samples.first());
                            if let Some(s) = sample {
                                candidate.ra = Some(s.ra_deg / 15.0);
                                candidate.dec = Some(s.dec_deg);
                                candidate.d_ra = Some(s.d_ra_per_minute());
                                candidate.d_dec = Some(s.d_dec_per_minute());
                            }
                            Some((index, candidate))
                        }
                        Err(ProviderError::NotObservable(_)) => {
                            log::info!("{} is not observable tonight; skipping", candidate.name);
                            None
                        }
                        Err(e) => {
                            log::warn!("Ephemeris fetch failed for {}; skipping: {}", candidate.name, e);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrent)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        refreshed.sort_by_key(|(index, _)| *index);
        refreshed.into_iter().map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalRepository;
    use crate::models::{Candidate, MPC_NEO};
    use crate::providers::fake::SiderealEphemeris;
    use crate::scheduler::registry::{MpcNeoConfig, SchedulingParams, TypeConfig};
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, h, m, 0).unwrap()
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::new().with(TypeConfig::MpcNeo(MpcNeoConfig {
            params: SchedulingParams {
                num_obs: 1,
                ..SchedulingParams::default()
            },
            ..MpcNeoConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_empty_store_renders_diagnostic() {
        let repo = Arc::new(LocalRepository::new());
        let planner = Planner::new(repo, registry(), Site::tmo());
        let window = Period::new(t(4, 0), t(5, 0)).unwrap();
        let outcome = planner.plan_window(window).await.unwrap();
        assert!(outcome.is_empty());
        assert!(outcome.lines.is_empty());
        assert!(outcome.text.lines().nth(1).unwrap().starts_with('#'));
    }

    #[tokio::test]
    async fn test_unknown_designation_is_skipped_by_prefetch() {
        let repo = Arc::new(LocalRepository::new());
        let mut c = Candidate::new("P21zzzz", MPC_NEO, "test", t(0, 0));
        c.ra = Some(3.0);
        c.dec = Some(10.0);
        c.num_exposures = Some(1);
        c.exposure_time = Some(300.0);
        c.start_observability = Some(t(4, 0));
        c.end_observability = Some(t(5, 0));
        repo.insert(&c).await.unwrap();

        let provider = Arc::new(SiderealEphemeris::new(Site::tmo()));
        let planner = Planner::new(repo, registry(), Site::tmo())
            .with_ephemeris(provider, EphemCadence::OneMinute);
        let window = Period::new(t(4, 0), t(5, 0)).unwrap();
        let outcome = planner.plan_window(window).await.unwrap();
        assert!(outcome.selected.is_empty());
        assert!(outcome.is_empty());
    }
}
