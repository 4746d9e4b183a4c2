//! In-memory providers for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use qtty::Degrees;

use super::error::{ProviderError, ProviderResult};
use super::types::{EphemCadence, EphemerisRequest, EphemerisSample, FeedEntry};
use super::{CandidateFeed, EphemerisProvider, UncertaintyProvider};
use crate::astro::altitude;
use crate::models::Site;

/// Feed returning a fixed list, or a fixed error.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    entries: Arc<Mutex<Result<Vec<FeedEntry>, ProviderError>>>,
}

impl StaticFeed {
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Ok(entries))),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Err(error))),
        }
    }

    /// Replace the list served from now on.
    pub fn set_entries(&self, entries: Vec<FeedEntry>) {
        *self.entries.lock() = Ok(entries);
    }
}

impl Default for StaticFeed {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl CandidateFeed for StaticFeed {
    async fn list_candidates(&self) -> ProviderResult<Vec<FeedEntry>> {
        self.entries.lock().clone()
    }
}

/// Uncertainty texts keyed by designation.
#[derive(Debug, Clone, Default)]
pub struct StaticUncertainty {
    texts: Arc<Mutex<HashMap<String, String>>>,
    failures_left: Arc<Mutex<HashMap<String, usize>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticUncertainty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, designation: &str, text: &str) -> Self {
        self.set_text(designation, text);
        self
    }

    pub fn set_text(&self, designation: &str, text: &str) {
        self.texts
            .lock()
            .insert(designation.to_string(), text.to_string());
    }

    /// Time out the next `times` requests for `designation`.
    pub fn fail_times(self, designation: &str, times: usize) -> Self {
        self.failures_left
            .lock()
            .insert(designation.to_string(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UncertaintyProvider for StaticUncertainty {
    async fn uncertainty(&self, designation: &str) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures_left.lock();
            if let Some(left) = failures.get_mut(designation) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProviderError::Timeout(designation.to_string()));
                }
            }
        }
        self.texts
            .lock()
            .get(designation)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("no map for {}", designation)))
    }
}

/// Ephemeris of objects that sit still on the sky.
///
/// Each request yields at most `block_len` samples from `request.start` at the
/// requested cadence, dropping samples below the altitude limit the way the
/// real service does.
#[derive(Debug, Clone)]
pub struct SiderealEphemeris {
    site: Site,
    block_len: usize,
    positions: Arc<Mutex<HashMap<String, (f64, f64)>>>,
    failing: Arc<Mutex<HashMap<String, ProviderError>>>,
    calls: Arc<AtomicUsize>,
}

impl SiderealEphemeris {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            block_len: 24 * 60,
            positions: Arc::default(),
            failing: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = block_len.max(1);
        self
    }

    /// Register a target at `ra_deg`, `dec_deg`.
    pub fn with_target(self, designation: &str, ra_deg: f64, dec_deg: f64) -> Self {
        self.positions
            .lock()
            .insert(designation.to_string(), (ra_deg, dec_deg));
        self
    }

    pub fn with_failure(self, designation: &str, error: ProviderError) -> Self {
        self.failing.lock().insert(designation.to_string(), error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EphemerisProvider for SiderealEphemeris {
    async fn ephemeris(&self, request: &EphemerisRequest) -> ProviderResult<Vec<EphemerisSample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failing.lock().get(&request.designation) {
            return Err(err.clone());
        }
        let (ra_deg, dec_deg) = self
            .positions
            .lock()
            .get(&request.designation)
            .copied()
            .ok_or_else(|| ProviderError::NotObservable(request.designation.clone()))?;

        let step = request.cadence.step();
        let samples = (0..self.block_len)
            .map(|i| request.start + step * i as i32)
            .filter(|t| {
                altitude(&self.site, Degrees::new(ra_deg), Degrees::new(dec_deg), *t).value()
                    >= request.altitude_limit
            })
            .map(|time| EphemerisSample {
                time,
                ra_deg,
                dec_deg,
                vmag: None,
                d_ra: 0.0,
                d_dec: 0.0,
            })
            .collect();
        Ok(samples)
    }

    fn block_span(&self, cadence: EphemCadence) -> Option<chrono::Duration> {
        Some(cadence.step() * self.block_len as i32)
    }
}
