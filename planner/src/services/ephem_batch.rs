//! Batch ephemeris export for the candidates currently selected.
//!
//! One file per candidate under `ephem_save_path`, named after the
//! designation. Format 0 writes schedule lines, format 1 the raw samples.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::config::{ConfigError, PlannerConfig};
use crate::db::{CandidateQuery, CandidateRepository, RepositoryError};
use crate::models::{Candidate, MPC_NEO};
use crate::providers::{EphemCadence, EphemerisProvider, EphemerisRequest, EphemerisSample};
use crate::scheduler::serializer::{mpc_description, render, ObservationLine, ScheduleLine};

#[derive(Debug, thiserror::Error)]
pub enum EphemBatchError {
    #[error("candidate store failed: {0}")]
    Store(#[from] RepositoryError),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output layout of the exported files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemFormat {
    Schedule,
    Raw,
}

impl EphemFormat {
    pub fn from_option(option: u8) -> Option<Self> {
        match option {
            0 => Some(EphemFormat::Schedule),
            1 => Some(EphemFormat::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EphemBatchOptions {
    pub save_path: PathBuf,
    pub format: EphemFormat,
    pub start_delay: Duration,
    pub cadence: EphemCadence,
    pub altitude_limit: f64,
    pub obs_code: String,
    pub filter: String,
    pub max_concurrent: usize,
}

impl EphemBatchOptions {
    pub fn from_config(config: &PlannerConfig) -> Result<Self, ConfigError> {
        let e = &config.ephemeris;
        Ok(Self {
            save_path: e.ephem_save_path.clone(),
            format: EphemFormat::from_option(e.ephem_format)
                .ok_or_else(|| ConfigError::invalid("ephem_format", "expected 0 or 1"))?,
            start_delay: Duration::hours(e.ephem_start_delay_hours),
            cadence: e.cadence()?,
            altitude_limit: config.thresholds.altitude_limit,
            obs_code: e.obs_code(),
            filter: config.scheduler.filter.clone(),
            max_concurrent: config.lifecycle.max_concurrent_requests.max(1),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EphemBatchReport {
    pub written: Vec<PathBuf>,
    pub failed: usize,
}

pub struct EphemBatch {
    repo: Arc<dyn CandidateRepository>,
    provider: Arc<dyn EphemerisProvider>,
    options: EphemBatchOptions,
}

impl EphemBatch {
    pub fn new(
        repo: Arc<dyn CandidateRepository>,
        provider: Arc<dyn EphemerisProvider>,
        options: EphemBatchOptions,
    ) -> Self {
        Self {
            repo,
            provider,
            options,
        }
    }

    /// Export ephemerides starting at `now` plus the configured delay.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<EphemBatchReport, EphemBatchError> {
        let selected = self
            .repo
            .query(&CandidateQuery::new().of_type(MPC_NEO).not_removed().not_rejected())
            .await?;
        let start = now + self.options.start_delay;

        tokio::fs::create_dir_all(&self.options.save_path)
            .await
            .map_err(|source| EphemBatchError::Io {
                path: self.options.save_path.clone(),
                source,
            })?;

        log::info!(
            "Exporting ephemerides for {} candidates to {}",
            selected.len(),
            self.options.save_path.display()
        );

        let results: Vec<Option<Result<PathBuf, EphemBatchError>>> = stream::iter(selected)
            .map(|candidate| self.export_one(candidate, start))
            .buffer_unordered(self.options.max_concurrent)
            .collect()
            .await;

        let mut report = EphemBatchReport::default();
        for result in results {
            match result {
                Some(Ok(path)) => report.written.push(path),
                Some(Err(e)) => return Err(e),
                None => report.failed += 1,
            }
        }
        report.written.sort();
        Ok(report)
    }

    /// `None` when the ephemeris is unavailable; the batch moves on.
    async fn export_one(
        &self,
        candidate: Candidate,
        start: DateTime<Utc>,
    ) -> Option<Result<PathBuf, EphemBatchError>> {
        let request = EphemerisRequest {
            designation: candidate.name.clone(),
            start,
            cadence: self.options.cadence,
            altitude_limit: self.options.altitude_limit,
            obs_code: self.options.obs_code.clone(),
        };
        let samples = match self.provider.ephemeris(&request).await {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("No ephemeris for {}: {}", candidate.name, e);
                return None;
            }
        };

        let body = match self.options.format {
            EphemFormat::Schedule => schedule_body(&candidate, &samples, &self.options.filter),
            EphemFormat::Raw => raw_body(&samples),
        };
        let path = file_path(&self.options.save_path, &candidate.name);
        match tokio::fs::write(&path, body).await {
            Ok(()) => Some(Ok(path)),
            Err(source) => Some(Err(EphemBatchError::Io { path, source })),
        }
    }
}

fn file_path(dir: &Path, designation: &str) -> PathBuf {
    dir.join(format!("{}.txt", designation))
}

/// One schedule line per sample.
pub fn schedule_body(candidate: &Candidate, samples: &[EphemerisSample], filter: &str) -> String {
    let lines: Vec<ScheduleLine> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| {
            ScheduleLine::Observation(ObservationLine {
                datetime: s.time,
                occupied: true,
                target: candidate.name.clone(),
                slew: i == 0,
                ra_deg: s.ra_deg,
                dec_deg: s.dec_deg,
                exposure_time: candidate.exposure_time.unwrap_or(0.0),
                num_exposures: candidate.num_exposures.unwrap_or(0) as f64,
                filter: filter.to_string(),
                description: mpc_description(
                    &candidate.name,
                    s.time,
                    s.ra_deg,
                    s.dec_deg,
                    Some(s.d_ra_per_minute()),
                    Some(s.d_dec_per_minute()),
                ),
            })
        })
        .collect();
    render(&lines, &format!("no ephemeris rows for {}", candidate.name))
}

/// Whitespace-delimited samples: date, time, RA/Dec degrees, V, motions ("/min).
pub fn raw_body(samples: &[EphemerisSample]) -> String {
    let mut out = String::new();
    for s in samples {
        let vmag = s.vmag.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v));
        out.push_str(&format!(
            "{} {:>11.6} {:>+10.6} {:>5} {:>+8.2} {:>+8.2}\n",
            s.time.format("%Y %m %d %H%M"),
            s.ra_deg,
            s.dec_deg,
            vmag,
            s.d_ra_per_minute(),
            s.d_dec_per_minute()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalRepository;
    use crate::models::Site;
    use crate::providers::fake::SiderealEphemeris;
    use crate::scheduler::serializer::parse_schedule;
    use chrono::TimeZone;

    fn options(dir: &Path, format: EphemFormat) -> EphemBatchOptions {
        EphemBatchOptions {
            save_path: dir.to_path_buf(),
            format,
            start_delay: Duration::zero(),
            cadence: EphemCadence::TenMinutes,
            altitude_limit: -90.0,
            obs_code: "654".to_string(),
            filter: "CLEAR".to_string(),
            max_concurrent: 2,
        }
    }

    async fn store_with(names: &[&str]) -> Arc<LocalRepository> {
        let repo = Arc::new(LocalRepository::new());
        let added = Utc.with_ymd_and_hms(2024, 10, 19, 0, 0, 0).unwrap();
        for name in names {
            let mut c = Candidate::new(*name, MPC_NEO, "test", added);
            c.ra = Some(1.0);
            c.dec = Some(20.0);
            repo.insert(&c).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_schedule_format_files_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = store_with(&["P21aaaa", "P21bbbb"]).await;
        let provider = Arc::new(
            SiderealEphemeris::new(Site::tmo())
                .with_block_len(6)
                .with_target("P21aaaa", 15.0, 20.0),
        );
        let batch = EphemBatch::new(repo, provider, options(dir.path(), EphemFormat::Schedule));
        let now = Utc.with_ymd_and_hms(2024, 10, 19, 6, 0, 0).unwrap();
        let report = batch.run(now).await.unwrap();

        assert_eq!(report.written, vec![dir.path().join("P21aaaa.txt")]);
        assert_eq!(report.failed, 1);
        let text = std::fs::read_to_string(&report.written[0]).unwrap();
        let lines = parse_schedule(&text).unwrap();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].datetime(), now);
    }

    #[tokio::test]
    async fn test_raw_format_one_row_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let repo = store_with(&["P21aaaa"]).await;
        let provider = Arc::new(
            SiderealEphemeris::new(Site::tmo())
                .with_block_len(3)
                .with_target("P21aaaa", 15.0, 20.0),
        );
        let batch = EphemBatch::new(repo, provider, options(dir.path(), EphemFormat::Raw));
        let now = Utc.with_ymd_and_hms(2024, 10, 19, 6, 0, 0).unwrap();
        let report = batch.run(now).await.unwrap();

        let text = std::fs::read_to_string(&report.written[0]).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("2024 10 19 0600"));
    }

    #[test]
    fn test_format_option() {
        assert_eq!(EphemFormat::from_option(0), Some(EphemFormat::Schedule));
        assert_eq!(EphemFormat::from_option(1), Some(EphemFormat::Raw));
        assert_eq!(EphemFormat::from_option(2), None);
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let mut config = PlannerConfig::default();
        assert!(EphemBatchOptions::from_config(&config).is_ok());

        config.ephemeris.ephem_format = 3;
        assert!(matches!(
            EphemBatchOptions::from_config(&config),
            Err(ConfigError::Invalid { option: "ephem_format", .. })
        ));
    }
}
