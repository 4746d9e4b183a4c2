//! Candidate lifecycle: ingest from the confirmation list, enrich, select.
//!
//! One cycle runs Phase A (ingest) and then Phase B (selection). A single
//! `now` is captured per cycle and threaded through both phases. Failures of
//! one candidate are logged and counted, never propagated; only an
//! unreachable feed or store ends a cycle early.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use super::exposure::{exposure_for_magnitude, parse_uncertainty, Uncertainty};
use super::observability::{Observability, ObservabilityEngine, ObservabilityError};
use crate::astro::{NightError, NightWindow};
use crate::config::{PlannerConfig, Thresholds};
use crate::control::{ControlCommand, ControlMessage};
use crate::db::{CandidateQuery, CandidateRepository, RepositoryError};
use crate::models::{
    truncate_to_second, Candidate, CandidateField, CandidateUpdate, Period, RejectedReason,
    MPC_NEO,
};
use crate::providers::{CandidateFeed, FeedEntry, ProviderError, UncertaintyProvider};

/// Removal reason for candidates the confirmation list no longer carries.
pub const REMOVED_FROM_FEED: &str = "Target removed from MPC list";

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("candidate feed unavailable: {0}")]
    FeedUnavailable(#[source] ProviderError),

    #[error("candidate store failed: {0}")]
    Store(#[from] RepositoryError),

    #[error("cannot determine tonight's window: {0}")]
    Night(#[from] NightError),
}

/// Tunables of the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOptions {
    pub author: String,
    pub ingest_lookback: Duration,
    pub selection_lookback: Duration,
    pub max_concurrent_requests: usize,
    pub uncertainty_retries: u32,
    pub request_timeout: StdDuration,
    /// Soft deadline of the enrichment fan-out; one cycle interval.
    pub cycle_deadline: StdDuration,
    pub thresholds: Thresholds,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            author: "neo-planner".to_string(),
            ingest_lookback: Duration::hours(48),
            selection_lookback: Duration::hours(24),
            max_concurrent_requests: 8,
            uncertainty_retries: 1,
            request_timeout: StdDuration::from_secs(120),
            cycle_deadline: StdDuration::from_secs(15 * 60),
            thresholds: Thresholds::default(),
        }
    }
}

impl LifecycleOptions {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            author: config.lifecycle.author.clone(),
            ingest_lookback: Duration::hours(config.lifecycle.ingest_lookback_hours),
            selection_lookback: Duration::hours(config.lifecycle.selection_lookback_hours),
            max_concurrent_requests: config.lifecycle.max_concurrent_requests.max(1),
            uncertainty_retries: config.lifecycle.uncertainty_retries,
            request_timeout: config.ephemeris.timeout(),
            cycle_deadline: config.cycle_interval(),
            thresholds: config.thresholds.clone(),
        }
    }
}

/// Outcome of Phase A.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_removed: usize,
    pub removed: usize,
    pub enrichment_failures: usize,
    pub store_failures: usize,
}

/// Outcome of Phase B.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub considered: usize,
    pub selected: usize,
    pub rejected_observability: usize,
    pub rejected_incomplete: usize,
    pub rejected_vmag: usize,
    pub rejected_rmse: usize,
    pub written: usize,
    pub store_failures: usize,
}

impl SelectionReport {
    fn count_rejection(&mut self, reason: RejectedReason) {
        match reason {
            RejectedReason::Observability => self.rejected_observability += 1,
            RejectedReason::Incomplete => self.rejected_incomplete += 1,
            RejectedReason::VMag => self.rejected_vmag += 1,
            RejectedReason::Rmse => self.rejected_rmse += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub ingest: IngestReport,
    pub selection: SelectionReport,
}

/// Field changes Phase B wants for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub reason: Option<RejectedReason>,
    pub update: CandidateUpdate,
    /// Clear a previous `rejected_reason`.
    pub clear_rejection: bool,
}

/// Keep one entry per designation, preferring the later `updated`.
///
/// Output order follows the first appearance of each designation.
pub fn dedup_entries(entries: Vec<FeedEntry>) -> Vec<FeedEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, FeedEntry> = HashMap::new();

    for entry in entries {
        match latest.get(&entry.designation) {
            None => {
                order.push(entry.designation.clone());
                latest.insert(entry.designation.clone(), entry);
            }
            Some(existing) if entry.updated > existing.updated => {
                latest.insert(entry.designation.clone(), entry);
            }
            Some(_) => {}
        }
    }

    order
        .into_iter()
        .filter_map(|designation| latest.remove(&designation))
        .collect()
}

/// A fresh candidate carrying the feed fields and the exposure plan.
pub fn candidate_from_feed(entry: &FeedEntry, author: &str, now: DateTime<Utc>) -> Candidate {
    let mut candidate = Candidate::new(&entry.designation, MPC_NEO, author, now);
    candidate.ra = entry.ra.map(|hours| hours.rem_euclid(24.0));
    candidate.dec = entry.dec;
    candidate.magnitude = entry.vmag;
    if let Some((n, t)) = entry.vmag.and_then(exposure_for_magnitude) {
        candidate.num_exposures = Some(n);
        candidate.exposure_time = Some(t);
    }
    candidate.updated = entry.updated.map(truncate_to_second);
    candidate.score = entry.score;
    candidate.n_obs = entry.num_obs;
    candidate.notes = entry.note.clone();
    candidate
}

fn apply_uncertainty(candidate: &mut Candidate, u: &Uncertainty) {
    candidate.rmse_ra = Some(u.rmse_ra);
    candidate.rmse_dec = Some(u.rmse_dec);
    candidate.approach_color = Some(u.approach_color);
}

/// Phase B decision for one candidate, given its fresh observability.
///
/// Filters apply in order (observability, completeness, magnitude, RMS) and
/// the first match wins. A window start already passed is kept; the end is
/// always refreshed.
pub fn decide(
    current: &Candidate,
    observability: &Result<Observability, ObservabilityError>,
    refreshed: Option<&Uncertainty>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Decision {
    let mut desired = current.clone();
    if let Some(u) = refreshed {
        apply_uncertainty(&mut desired, u);
    }

    let window = match observability {
        Ok(obs) => {
            if let Some(p) = obs.position {
                desired.ra = Some((p.ra_deg / 15.0).rem_euclid(24.0));
                desired.dec = Some(p.dec_deg);
                desired.d_ra = Some(p.d_ra_per_minute());
                desired.d_dec = Some(p.d_dec_per_minute());
                if let Some(v) = p.vmag {
                    desired.magnitude.get_or_insert(v);
                }
            }
            obs.window
        }
        Err(_) => None,
    };

    if let Some(w) = window {
        let start = truncate_to_second(w.start);
        let end = truncate_to_second(w.end);
        let kept_start = match current.start_observability {
            Some(stored) if now >= stored && stored < end => stored,
            _ => start,
        };
        if kept_start < end {
            desired.start_observability = Some(kept_start);
            desired.end_observability = Some(end);
        }
    }

    let in_progress = current
        .observability_window()
        .is_some_and(|p| p.contains(now));

    let reason = if observability.is_err() {
        Some(RejectedReason::Incomplete)
    } else if window.is_none() && !in_progress {
        Some(RejectedReason::Observability)
    } else if desired.rmse_ra.is_none() || desired.rmse_dec.is_none() {
        Some(RejectedReason::Incomplete)
    } else if desired.magnitude.is_some_and(|v| v > thresholds.v_mag_max) {
        Some(RejectedReason::VMag)
    } else if desired.rmse_ra.is_some_and(|r| r > thresholds.ra_rmse_max)
        || desired.rmse_dec.is_some_and(|r| r > thresholds.dec_rmse_max)
    {
        Some(RejectedReason::Rmse)
    } else {
        None
    };

    desired.rejected_reason = reason;
    Decision {
        reason,
        update: CandidateUpdate::diff(current, &desired),
        clear_rejection: reason.is_none() && current.rejected_reason.is_some(),
    }
}

/// The lifecycle manager. All collaborators are injected.
pub struct LifecycleManager {
    repo: Arc<dyn CandidateRepository>,
    feed: Arc<dyn CandidateFeed>,
    uncertainty: Arc<dyn UncertaintyProvider>,
    engine: ObservabilityEngine,
    options: LifecycleOptions,
}

impl LifecycleManager {
    pub fn new(
        repo: Arc<dyn CandidateRepository>,
        feed: Arc<dyn CandidateFeed>,
        uncertainty: Arc<dyn UncertaintyProvider>,
        engine: ObservabilityEngine,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            repo,
            feed,
            uncertainty,
            engine,
            options,
        }
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// One full cycle at `now`: ingest, then select over tonight's window.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, LifecycleError> {
        let ingest = self.ingest(now).await?;
        let night = NightWindow::around(self.engine.site(), now)?.observing_window()?;
        let selection = self.select(now, night).await?;
        Ok(CycleReport { ingest, selection })
    }

    /// Uncertainty for one designation with the configured retries.
    async fn fetch_uncertainty(&self, designation: &str) -> Result<Uncertainty, ProviderError> {
        let mut last_error = ProviderError::Unavailable(designation.to_string());
        for attempt in 0..=self.options.uncertainty_retries {
            let result = tokio::time::timeout(
                self.options.request_timeout,
                self.uncertainty.uncertainty(designation),
            )
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(designation.to_string())));

            match result {
                Ok(text) => {
                    return parse_uncertainty(&text)
                        .map_err(|e| ProviderError::Parse(format!("{}: {}", designation, e)));
                }
                Err(e) if e.is_transient() => {
                    log::debug!(
                        "Uncertainty request for {} failed (attempt {}): {}",
                        designation,
                        attempt + 1,
                        e
                    );
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Fetch uncertainties concurrently; stops collecting at the cycle
    /// deadline and returns whatever finished.
    async fn enrich(&self, designations: Vec<String>) -> HashMap<String, Result<Uncertainty, ProviderError>> {
        let deadline = tokio::time::Instant::now() + self.options.cycle_deadline;
        let mut pending = stream::iter(designations)
            .map(|designation| async move {
                let result = self.fetch_uncertainty(&designation).await;
                (designation, result)
            })
            .buffer_unordered(self.options.max_concurrent_requests.max(1));

        let mut results = HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((designation, result))) => {
                    results.insert(designation, result);
                }
                Ok(None) => break,
                Err(_) => {
                    log::warn!(
                        "Enrichment deadline reached with {} results; continuing with partial data",
                        results.len()
                    );
                    break;
                }
            }
        }
        results
    }

    /// Phase A: mirror the confirmation list into the store.
    pub async fn ingest(&self, now: DateTime<Utc>) -> Result<IngestReport, LifecycleError> {
        let mut report = IngestReport::default();

        let entries = self
            .feed
            .list_candidates()
            .await
            .map_err(LifecycleError::FeedUnavailable)?;
        report.fetched = entries.len();
        let entries = dedup_entries(entries);
        report.duplicates = report.fetched - entries.len();

        let mut fresh: Vec<Candidate> = entries
            .iter()
            .map(|e| candidate_from_feed(e, &self.options.author, now))
            .collect();

        let enrichment = self
            .enrich(fresh.iter().map(|c| c.name.clone()).collect())
            .await;
        for candidate in &mut fresh {
            match enrichment.get(&candidate.name) {
                Some(Ok(u)) => apply_uncertainty(candidate, u),
                Some(Err(e)) => {
                    report.enrichment_failures += 1;
                    log::warn!("No uncertainty for {}: {}", candidate.name, e);
                }
                None => report.enrichment_failures += 1,
            }
        }

        let stored = self
            .repo
            .query(
                &CandidateQuery::new()
                    .of_type(MPC_NEO)
                    .added_since(now - self.options.ingest_lookback),
            )
            .await?;
        let by_id: HashMap<_, _> = stored.iter().map(|c| (c.id.clone(), c)).collect();
        let mut seen = HashSet::new();

        for candidate in &fresh {
            seen.insert(candidate.id.clone());
            let existing = match by_id.get(&candidate.id) {
                Some(c) => Some((*c).clone()),
                None => match self.repo.insert(candidate).await {
                    Ok(_) => {
                        report.inserted += 1;
                        log::info!("New candidate {}", candidate.name);
                        continue;
                    }
                    // Older than the lookback; treat as present.
                    Err(RepositoryError::AlreadyExists { .. }) => {
                        match self.repo.get(&candidate.id).await {
                            Ok(found) => found,
                            Err(e) => {
                                report.store_failures += 1;
                                log::warn!("Cannot load {}: {}", candidate.name, e);
                                continue;
                            }
                        }
                    }
                    Err(e) => {
                        report.store_failures += 1;
                        log::warn!("Cannot insert {}: {}", candidate.name, e);
                        continue;
                    }
                },
            };
            let Some(existing) = existing else {
                continue;
            };

            if existing.is_removed() {
                report.skipped_removed += 1;
                log::warn!(
                    "Candidate {} reappeared in the feed but was removed ({})",
                    existing.name,
                    existing.removed_reason.as_deref().unwrap_or_default()
                );
                continue;
            }

            let update = CandidateUpdate::diff(&existing, candidate);
            if update.is_empty() {
                report.unchanged += 1;
                continue;
            }
            match self.repo.update(&existing.id, &update).await {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    report.store_failures += 1;
                    log::warn!("Cannot update {}: {}", existing.name, e);
                }
            }
        }

        for gone in stored
            .iter()
            .filter(|c| !c.is_removed() && !seen.contains(&c.id))
        {
            match self.repo.remove(&gone.id, REMOVED_FROM_FEED).await {
                Ok(_) => {
                    report.removed += 1;
                    log::info!("Removed {}: {}", gone.name, REMOVED_FROM_FEED);
                }
                Err(e) => {
                    report.store_failures += 1;
                    log::warn!("Cannot remove {}: {}", gone.name, e);
                }
            }
        }

        log::info!(
            "Ingest: {} fetched, {} new, {} updated, {} removed, {} enrichment failures",
            report.fetched,
            report.inserted,
            report.updated,
            report.removed,
            report.enrichment_failures
        );
        Ok(report)
    }

    /// Phase B: recompute windows and rejection state over `night`.
    pub async fn select(
        &self,
        now: DateTime<Utc>,
        night: Period,
    ) -> Result<SelectionReport, LifecycleError> {
        let mut report = SelectionReport::default();
        let candidates = self
            .repo
            .query(
                &CandidateQuery::new()
                    .of_type(MPC_NEO)
                    .not_removed()
                    .added_since(now - self.options.selection_lookback),
            )
            .await?;
        report.considered = candidates.len();

        let evaluated: Vec<_> = stream::iter(candidates.iter().enumerate())
            .map(|(idx, candidate)| async move {
                let observability = self.engine.compute(candidate, night).await;
                let refreshed = if candidate.rmse_ra.is_none() || candidate.rmse_dec.is_none() {
                    self.fetch_uncertainty(&candidate.name).await.ok()
                } else {
                    None
                };
                (idx, observability, refreshed)
            })
            .buffer_unordered(self.options.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut evaluated = evaluated;
        evaluated.sort_by_key(|(idx, _, _)| *idx);

        for (idx, observability, refreshed) in evaluated {
            let candidate = &candidates[idx];
            if let Err(e) = &observability {
                log::warn!("Observability of {} unknown: {}", candidate.name, e);
            }
            let decision = decide(
                candidate,
                &observability,
                refreshed.as_ref(),
                &self.options.thresholds,
                now,
            );

            match decision.reason {
                Some(reason) => {
                    report.count_rejection(reason);
                    if candidate.rejected_reason != Some(reason) {
                        log::info!("Rejecting {}: {}", candidate.name, reason);
                    }
                }
                None => report.selected += 1,
            }

            if let Err(e) = self.write_decision(candidate, &decision).await {
                report.store_failures += 1;
                log::warn!("Cannot write selection of {}: {}", candidate.name, e);
            } else if !decision.update.is_empty() || decision.clear_rejection {
                report.written += 1;
            }
        }

        log::info!(
            "Selection: {} considered, {} selected, {} rejected",
            report.considered,
            report.selected,
            report.considered - report.selected
        );
        Ok(report)
    }

    async fn write_decision(
        &self,
        candidate: &Candidate,
        decision: &Decision,
    ) -> Result<(), RepositoryError> {
        if !decision.update.is_empty() {
            self.repo.update(&candidate.id, &decision.update).await?;
        }
        if decision.clear_rejection {
            self.repo
                .set_null(&candidate.id, CandidateField::RejectedReason)
                .await?;
        }
        Ok(())
    }

    /// Run cycles every `interval` until an `Abort` addressed to `name`.
    ///
    /// `Ping!` is answered on `replies`, `Cycle` starts a cycle immediately.
    /// A closed control channel leaves the timer in charge.
    pub async fn run_daemon(
        &self,
        name: &str,
        interval: StdDuration,
        mut control: mpsc::Receiver<ControlMessage>,
        replies: mpsc::Sender<ControlMessage>,
    ) -> Result<(), LifecycleError> {
        let mut control_open = true;
        loop {
            match self.run_cycle(Utc::now()).await {
                Ok(report) => log::debug!("Cycle finished: {:?}", report),
                Err(LifecycleError::Store(e)) => return Err(LifecycleError::Store(e)),
                Err(e) => log::warn!("Cycle degraded: {}", e),
            }

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    message = control.recv(), if control_open => {
                        let Some(message) = message else {
                            control_open = false;
                            continue;
                        };
                        if !message.is_for(name) {
                            continue;
                        }
                        match message.command {
                            ControlCommand::Ping => {
                                let pong = ControlMessage::new(name, ControlCommand::Pong);
                                if replies.send(pong).await.is_err() {
                                    log::debug!("Control reply channel closed");
                                }
                            }
                            ControlCommand::Cycle => break,
                            ControlCommand::Abort => {
                                log::info!("Lifecycle aborted by control message");
                                return Ok(());
                            }
                            other => log::debug!("Ignoring control payload {}", other),
                        }
                    }
                }
            }
        }
    }
}
