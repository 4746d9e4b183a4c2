//! Observability windows from the mount envelope and the site geometry.
//!
//! A time is observable when the target's hour angle lies inside the
//! declination-dependent limits and its altitude is at or above the
//! configured limit. The window is the longest contiguous run of observable
//! samples inside the scheduling window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use qtty::Degrees;

use crate::astro::{altitude, ha_limits, hour_angle_at, is_reachable};
use crate::models::{Candidate, Period, Site};
use crate::providers::{
    EphemCadence, EphemerisProvider, EphemerisRequest, EphemerisSample, ProviderError,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObservabilityError {
    #[error("ephemeris unavailable for {designation}: {source}")]
    EphemUnavailable {
        designation: String,
        #[source]
        source: ProviderError,
    },

    #[error("candidate {0} has no coordinates")]
    MissingCoordinates(String),
}

/// Result of one observability computation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observability {
    pub window: Option<Period>,
    /// Ephemeris sample at the start of the window (or the first sample when
    /// there is no window); `None` on the sidereal path.
    pub position: Option<EphemerisSample>,
}

impl Observability {
    pub fn not_observable() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct ObservabilityEngine {
    site: Site,
    altitude_limit: f64,
    cadence: EphemCadence,
    ephemeris: Option<Arc<dyn EphemerisProvider>>,
}

impl ObservabilityEngine {
    /// Engine testing fixed coordinates only.
    pub fn new(site: Site, altitude_limit: f64) -> Self {
        Self {
            site,
            altitude_limit,
            cadence: EphemCadence::OneMinute,
            ephemeris: None,
        }
    }

    /// Use ephemerides at `cadence` for moving targets.
    pub fn with_ephemeris(mut self, provider: Arc<dyn EphemerisProvider>, cadence: EphemCadence) -> Self {
        self.ephemeris = Some(provider);
        self.cadence = cadence;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn uses_ephemeris(&self) -> bool {
        self.ephemeris.is_some()
    }

    /// Whether a fixed position is observable at `t`.
    pub fn is_observable(&self, ra_deg: f64, dec_deg: f64, t: DateTime<Utc>) -> bool {
        let ra = Degrees::new(ra_deg);
        let dec = Degrees::new(dec_deg);
        is_reachable(hour_angle_at(&self.site, ra, t), dec)
            && altitude(&self.site, ra, dec, t).value() >= self.altitude_limit
    }

    /// Window of a fixed position, sampled at the engine cadence.
    pub fn sidereal_window(&self, ra_deg: f64, dec_deg: f64, window: Period) -> Option<Period> {
        ha_limits(Degrees::new(dec_deg))?;

        let step = self.cadence.step();
        let mut points = Vec::new();
        let mut t = window.start;
        while t < window.end {
            points.push((t, self.is_observable(ra_deg, dec_deg, t)));
            t += step;
        }
        points.push((window.end, self.is_observable(ra_deg, dec_deg, window.end)));

        longest_run(&points, step, window).map(|(period, _)| period)
    }

    /// Fetch consecutive ephemeris blocks until the samples reach `window.end`.
    ///
    /// Each block starts where the previous one stopped covering: after its
    /// last sample, or one provider block span later when the service dropped
    /// every row (target below the altitude limit). An empty block with no
    /// known span ends the fetch.
    pub async fn ephemeris_samples(
        &self,
        designation: &str,
        window: Period,
    ) -> Result<Vec<EphemerisSample>, ObservabilityError> {
        let Some(provider) = &self.ephemeris else {
            return Ok(Vec::new());
        };
        let unavailable = |source: ProviderError| ObservabilityError::EphemUnavailable {
            designation: designation.to_string(),
            source,
        };

        let step = self.cadence.step();
        let mut span = provider.block_span(self.cadence);
        let mut request = EphemerisRequest {
            designation: designation.to_string(),
            start: window.start,
            cadence: self.cadence,
            altitude_limit: self.altitude_limit,
            obs_code: self.site.obs_code.clone(),
        };
        let mut samples: Vec<EphemerisSample> = Vec::new();
        let mut blocks = 0usize;

        while request.start <= window.end {
            let block = match provider.ephemeris(&request).await {
                Ok(block) => block,
                Err(ProviderError::NotObservable(_)) if blocks == 0 => return Ok(Vec::new()),
                Err(ProviderError::NotObservable(_)) => break,
                Err(e) => return Err(unavailable(e)),
            };
            blocks += 1;

            let last_time = samples.last().map(|s| s.time);
            let fresh: Vec<EphemerisSample> = block
                .into_iter()
                .filter(|s| last_time.map_or(true, |t| s.time > t))
                .collect();

            let mut next = match span {
                Some(span) => request.start + span.max(step),
                None => request.start,
            };
            if let Some(last) = fresh.last() {
                let covered = last.time - request.start + step;
                span = Some(span.map_or(covered, |known| known.max(covered)));
                next = next.max(last.time + step);
            }
            samples.extend(fresh);

            if samples.last().is_some_and(|s| s.time >= window.end) {
                break;
            }
            if next <= request.start {
                break;
            }
            request.start = next;
            log::debug!(
                "Fetching ephemeris block {} of {} from {}",
                blocks + 1,
                designation,
                request.start
            );
        }

        Ok(samples)
    }

    /// Window over ephemeris samples, plus the sample the window starts at.
    pub fn window_from_samples(
        &self,
        samples: &[EphemerisSample],
        window: Period,
    ) -> Option<(Period, EphemerisSample)> {
        let mut in_range: Vec<&EphemerisSample> = Vec::new();
        for sample in samples.iter().filter(|s| s.time >= window.start) {
            in_range.push(sample);
            if sample.time > window.end {
                break;
            }
        }

        let points: Vec<(DateTime<Utc>, bool)> = in_range
            .iter()
            .map(|s| (s.time, self.is_observable(s.ra_deg, s.dec_deg, s.time)))
            .collect();
        let (period, first) = longest_run(&points, self.cadence.step(), window)?;
        Some((period, *in_range[first]))
    }

    /// Observability of a candidate over `window`.
    ///
    /// With an ephemeris provider the candidate is treated as a moving target
    /// looked up by name; otherwise its stored RA/Dec are used.
    pub async fn compute(
        &self,
        candidate: &Candidate,
        window: Period,
    ) -> Result<Observability, ObservabilityError> {
        if self.ephemeris.is_some() {
            let samples = self.ephemeris_samples(&candidate.name, window).await?;
            return Ok(match self.window_from_samples(&samples, window) {
                Some((period, position)) => Observability {
                    window: Some(period),
                    position: Some(position),
                },
                None => Observability {
                    window: None,
                    position: samples.first().copied(),
                },
            });
        }

        let (Some(ra_deg), Some(dec)) = (candidate.ra_degrees(), candidate.dec) else {
            return Err(ObservabilityError::MissingCoordinates(candidate.name.clone()));
        };
        Ok(Observability {
            window: self.sidereal_window(ra_deg, dec, window),
            position: None,
        })
    }
}

/// Longest run of observable points, returned as a period clipped to
/// `window` and the index of the run's first point.
///
/// Points farther apart than `step` break a run. A run that starts at the
/// first point, within one step of the window start, starts at the window
/// start. Earlier runs win ties.
pub fn longest_run(
    points: &[(DateTime<Utc>, bool)],
    step: Duration,
    window: Period,
) -> Option<(Period, usize)> {
    let max_gap = step + Duration::seconds(1);
    let mut best: Option<(usize, usize)> = None;
    let mut current: Option<usize> = None;

    for (i, &(t, observable)) in points.iter().enumerate() {
        let contiguous = i > 0 && t - points[i - 1].0 <= max_gap;
        if !observable {
            current = None;
            continue;
        }
        let start = match current {
            Some(start) if contiguous => start,
            _ => i,
        };
        current = Some(start);

        let span = t - points[start].0;
        let better = match best {
            None => true,
            Some((s, e)) => span > points[e].0 - points[s].0,
        };
        if better {
            best = Some((start, i));
        }
    }

    let (first, last) = best?;
    let start = if first == 0 && points[0].0 - window.start <= step {
        window.start
    } else {
        points[first].0.max(window.start)
    };
    let end = points[last].0.min(window.end);
    Period::new(start, end).map(|p| (p, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::SiderealEphemeris;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, h, m, 0).unwrap()
    }

    #[test]
    fn test_longest_run_picks_longest() {
        let window = Period::new(t(1, 0), t(1, 10)).unwrap();
        let pattern = [true, true, false, true, true, true, true, false, true, true, true];
        let points: Vec<_> = pattern
            .iter()
            .enumerate()
            .map(|(i, &ok)| (t(1, 0) + Duration::minutes(i as i64), ok))
            .collect();
        let (period, first) = longest_run(&points, Duration::minutes(1), window).unwrap();
        assert_eq!(first, 3);
        assert_eq!(period, Period::new(t(1, 3), t(1, 6)).unwrap());
    }

    #[test]
    fn test_longest_run_starts_at_window_start_when_inside() {
        let window = Period::new(t(1, 0), t(1, 5)).unwrap();
        let points: Vec<_> = (0..=5)
            .map(|i| (t(1, 0) + Duration::seconds(30) + Duration::minutes(i), true))
            .collect();
        let (period, _) = longest_run(&points, Duration::minutes(1), window).unwrap();
        assert_eq!(period.start, window.start);
        assert_eq!(period.end, window.end);
    }

    #[test]
    fn test_gaps_break_runs() {
        let window = Period::new(t(1, 0), t(2, 0)).unwrap();
        let points = vec![
            (t(1, 0), true),
            (t(1, 1), true),
            (t(1, 30), true),
            (t(1, 31), true),
            (t(1, 32), true),
        ];
        let (period, first) = longest_run(&points, Duration::minutes(1), window).unwrap();
        assert_eq!(first, 2);
        assert_eq!(period, Period::new(t(1, 30), t(1, 32)).unwrap());
    }

    #[test]
    fn test_nothing_observable() {
        let window = Period::new(t(1, 0), t(1, 2)).unwrap();
        let points = vec![(t(1, 0), false), (t(1, 1), false)];
        assert!(longest_run(&points, Duration::minutes(1), window).is_none());
    }

    #[test]
    fn test_closed_declination_bands() {
        let engine = ObservabilityEngine::new(Site::tmo(), 0.0);
        let window = Period::new(t(2, 0), t(12, 0)).unwrap();
        assert!(engine.sidereal_window(45.0, 74.0, window).is_none());
        assert!(engine.sidereal_window(45.0, -37.0, window).is_none());
        assert!(engine.sidereal_window(45.0, 80.0, window).is_none());
    }

    fn night() -> Period {
        Period::new(t(2, 0), t(12, 0)).unwrap()
    }

    fn moving(name: &str) -> Candidate {
        Candidate::new(name, crate::models::MPC_NEO, "neo-planner", t(0, 0))
    }

    fn ephemeris_engine(provider: SiderealEphemeris) -> ObservabilityEngine {
        ObservabilityEngine::new(Site::tmo(), 0.0)
            .with_ephemeris(Arc::new(provider), EphemCadence::OneMinute)
    }

    #[tokio::test]
    async fn test_short_blocks_cover_whole_night() {
        let sidereal = ObservabilityEngine::new(Site::tmo(), 0.0);
        for ra in [0.0, 30.0, 60.0, 90.0, 120.0] {
            let provider = SiderealEphemeris::new(Site::tmo())
                .with_block_len(60)
                .with_target("P21move", ra, 20.0);
            let engine = ephemeris_engine(provider.clone());

            let obs = engine.compute(&moving("P21move"), night()).await.unwrap();
            let expected = sidereal.sidereal_window(ra, 20.0, night());
            assert!(expected.is_some(), "ra {} should rise tonight", ra);
            assert_eq!(obs.window, expected, "ra {}", ra);
            assert!(provider.calls() >= 10, "ra {}: {} blocks", ra, provider.calls());
        }
    }

    #[tokio::test]
    async fn test_block_samples_are_not_duplicated() {
        let provider = SiderealEphemeris::new(Site::tmo())
            .with_block_len(45)
            .with_target("P21dup", 0.0, 20.0);
        let engine = ephemeris_engine(provider);
        let samples = engine.ephemeris_samples("P21dup", night()).await.unwrap();
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
        assert!(samples.last().unwrap().time >= night().end);
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let provider = SiderealEphemeris::new(Site::tmo())
            .with_target("P21fail", 0.0, 20.0)
            .with_failure("P21fail", ProviderError::Timeout("slow".to_string()));
        let engine = ephemeris_engine(provider);
        let err = engine
            .compute(&moving("P21fail"), night())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ObservabilityError::EphemUnavailable {
                source: ProviderError::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_object_has_no_window() {
        let engine = ephemeris_engine(SiderealEphemeris::new(Site::tmo()));
        let obs = engine.compute(&moving("P21none"), night()).await.unwrap();
        assert_eq!(obs, Observability::not_observable());
    }

    #[test]
    fn test_window_across_ra_zero() {
        // Local sidereal time passes 0h near 05:58 UTC.
        let engine = ObservabilityEngine::new(Site::tmo(), 0.0);
        let before = engine.sidereal_window(359.75, 20.0, night()).unwrap();
        let after = engine.sidereal_window(0.25, 20.0, night()).unwrap();

        for w in [before, after] {
            assert!(w.contains(t(5, 50)) && w.contains(t(6, 10)));
        }
        let near = |a: DateTime<Utc>, b: DateTime<Utc>| (a - b).num_seconds().abs() <= 60;
        assert!(near(before.start, t(2, 28)), "{}", before.start);
        assert!(near(before.end, t(9, 56)), "{}", before.end);
        assert!(near(after.start - Duration::minutes(2), before.start));
        assert!(near(after.end - Duration::minutes(2), before.end));
    }
}
