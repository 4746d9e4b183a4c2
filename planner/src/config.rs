//! Planner configuration, read from a TOML file.
//!
//! Every option has a default except the site coordinates; a file that does
//! not place the observatory is rejected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::DatabaseSettings;
use crate::models::Site;
use crate::providers::EphemCadence;

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required option {0}")]
    Missing(&'static str),

    #[error("invalid value for {option}: {message}")]
    Invalid {
        option: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            option,
            message: message.into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlannerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub ephemeris: EphemerisSettings,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub site: SiteSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub feed: FeedSettings,
}

impl PlannerConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PlannerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.site.to_site()?;
        self.ephemeris.cadence()?;
        if self.ephemeris.ephem_format > 1 {
            return Err(ConfigError::invalid("ephem_format", "expected 0 or 1"));
        }
        if self.thresholds.dec_min >= self.thresholds.dec_max {
            return Err(ConfigError::invalid(
                "dec_min",
                format!(
                    "{} is not below dec_max {}",
                    self.thresholds.dec_min, self.thresholds.dec_max
                ),
            ));
        }
        if self.scheduler.resolution_seconds == 0 {
            return Err(ConfigError::invalid("resolution_seconds", "must be positive"));
        }
        if self.scheduler.gap_minutes == 0 {
            return Err(ConfigError::invalid("gap_minutes", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.scheduler.temperature) {
            return Err(ConfigError::invalid("temperature", "expected a value in [0, 1)"));
        }
        if self.scheduler.num_obs == 0 {
            return Err(ConfigError::invalid("num_obs", "at least one visit is required"));
        }
        if self.lifecycle.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_requests",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Observatory described by `[site]`.
    pub fn site(&self) -> Result<Site, ConfigError> {
        self.site.to_site()
    }

    /// Lifecycle cycle interval.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.database.database_wait_time_minutes.max(1) * 60)
    }
}

/// `[ephemeris]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemerisSettings {
    /// 0 = 1 min, 1 = 10 min, 2 = 30 min, 3 = 1 h
    #[serde(default)]
    pub ephem_interval: u8,
    #[serde(default = "default_ephem_timeout_seconds")]
    pub ephem_timeout_seconds: u64,
    #[serde(default)]
    pub ephem_start_delay_hours: i64,
    #[serde(default = "default_ephem_save_path")]
    pub ephem_save_path: PathBuf,
    #[serde(default = "default_obs_code")]
    pub ephems_obs_code: u32,
    /// 0 = scheduler pipe format, 1 = raw rows
    #[serde(default)]
    pub ephem_format: u8,
}

fn default_ephem_timeout_seconds() -> u64 {
    120
}

fn default_ephem_save_path() -> PathBuf {
    PathBuf::from("ephemerides")
}

fn default_obs_code() -> u32 {
    654
}

impl Default for EphemerisSettings {
    fn default() -> Self {
        Self {
            ephem_interval: 0,
            ephem_timeout_seconds: default_ephem_timeout_seconds(),
            ephem_start_delay_hours: 0,
            ephem_save_path: default_ephem_save_path(),
            ephems_obs_code: default_obs_code(),
            ephem_format: 0,
        }
    }
}

impl EphemerisSettings {
    pub fn cadence(&self) -> Result<EphemCadence, ConfigError> {
        EphemCadence::from_option(self.ephem_interval)
            .ok_or_else(|| ConfigError::invalid("ephem_interval", "expected 0..=3"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ephem_timeout_seconds)
    }

    /// Observatory code as sent to the ephemeris service (three digits).
    pub fn obs_code(&self) -> String {
        format!("{:03}", self.ephems_obs_code)
    }
}

/// `[thresholds]`: selection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_v_mag_max")]
    pub v_mag_max: f64,
    #[serde(default = "default_rmse_max")]
    pub ra_rmse_max: f64,
    #[serde(default = "default_rmse_max")]
    pub dec_rmse_max: f64,
    #[serde(default = "default_n_obs_max")]
    pub n_obs_max: i32,
    #[serde(default)]
    pub score_min: f64,
    #[serde(default = "default_dec_min")]
    pub dec_min: f64,
    #[serde(default = "default_dec_max")]
    pub dec_max: f64,
    #[serde(default)]
    pub altitude_limit: f64,
}

fn default_v_mag_max() -> f64 {
    21.5
}

fn default_rmse_max() -> f64 {
    50.0
}

fn default_n_obs_max() -> i32 {
    1000
}

fn default_dec_min() -> f64 {
    -25.0
}

fn default_dec_max() -> f64 {
    65.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            v_mag_max: default_v_mag_max(),
            ra_rmse_max: default_rmse_max(),
            dec_rmse_max: default_rmse_max(),
            n_obs_max: default_n_obs_max(),
            score_min: 0.0,
            dec_min: default_dec_min(),
            dec_max: default_dec_max(),
            altitude_limit: 0.0,
        }
    }
}

/// `[site]`. Latitude and longitude have no default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub latitude: Option<f64>,
    /// East-positive degrees
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub twilight_offset_minutes: i64,
    #[serde(default = "default_site_obs_code")]
    pub obs_code: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_site_obs_code() -> String {
    "654".to_string()
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            elevation: 0.0,
            timezone: default_timezone(),
            twilight_offset_minutes: 0,
            obs_code: default_site_obs_code(),
        }
    }
}

impl SiteSettings {
    pub fn to_site(&self) -> Result<Site, ConfigError> {
        let latitude = self.latitude.ok_or(ConfigError::Missing("site.latitude"))?;
        let longitude = self.longitude.ok_or(ConfigError::Missing("site.longitude"))?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::invalid("site.latitude", latitude.to_string()));
        }
        if !(-180.0..=360.0).contains(&longitude) {
            return Err(ConfigError::invalid("site.longitude", longitude.to_string()));
        }
        Ok(Site {
            latitude,
            longitude,
            elevation: self.elevation,
            timezone: self.timezone.clone(),
            twilight_offset_minutes: self.twilight_offset_minutes,
            obs_code: self.obs_code.clone(),
        })
    }
}

/// `[lifecycle]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Author recorded on ingested candidates; part of their identity.
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_ingest_lookback_hours")]
    pub ingest_lookback_hours: i64,
    #[serde(default = "default_selection_lookback_hours")]
    pub selection_lookback_hours: i64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_uncertainty_retries")]
    pub uncertainty_retries: u32,
    #[serde(default = "default_control_name")]
    pub control_name: String,
}

fn default_author() -> String {
    "neo-planner".to_string()
}

fn default_ingest_lookback_hours() -> i64 {
    48
}

fn default_selection_lookback_hours() -> i64 {
    24
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_uncertainty_retries() -> u32 {
    1
}

fn default_control_name() -> String {
    "lifecycle".to_string()
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            author: default_author(),
            ingest_lookback_hours: default_ingest_lookback_hours(),
            selection_lookback_hours: default_selection_lookback_hours(),
            max_concurrent_requests: default_max_concurrent_requests(),
            uncertainty_retries: default_uncertainty_retries(),
            control_name: default_control_name(),
        }
    }
}

/// Explicit slew/setup time between two targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOverride {
    pub from: String,
    pub to: String,
    pub seconds: u64,
}

/// `[scheduler]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Slot length Δ
    #[serde(default = "default_resolution_seconds")]
    pub resolution_seconds: u64,
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: u64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_minutes_without_focus")]
    pub max_minutes_without_focus: i64,
    #[serde(default = "default_num_obs")]
    pub num_obs: u32,
    #[serde(default = "default_min_minutes_between_obs")]
    pub min_minutes_between_obs: i64,
    /// Default transition between different targets.
    #[serde(default)]
    pub transition_seconds: u64,
    #[serde(default)]
    pub transitions: Vec<TransitionOverride>,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_resolution_seconds() -> u64 {
    60
}

fn default_gap_minutes() -> u64 {
    1
}

fn default_max_minutes_without_focus() -> i64 {
    65
}

fn default_num_obs() -> u32 {
    2
}

fn default_min_minutes_between_obs() -> i64 {
    45
}

fn default_filter() -> String {
    "CLEAR".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("schedule.txt")
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            resolution_seconds: default_resolution_seconds(),
            gap_minutes: default_gap_minutes(),
            temperature: 0.0,
            seed: None,
            max_minutes_without_focus: default_max_minutes_without_focus(),
            num_obs: default_num_obs(),
            min_minutes_between_obs: default_min_minutes_between_obs(),
            transition_seconds: 0,
            transitions: Vec::new(),
            filter: default_filter(),
            output_path: default_output_path(),
        }
    }
}

/// `[feed]`: endpoints of the HTTP implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_neocp_url")]
    pub neocp_url: String,
    #[serde(default = "default_uncertainty_url")]
    pub uncertainty_url: String,
    #[serde(default = "default_ephemeris_url")]
    pub ephemeris_url: String,
}

fn default_neocp_url() -> String {
    "https://www.minorplanetcenter.net/Extended_Files/neocp.json".to_string()
}

fn default_uncertainty_url() -> String {
    "https://cgi.minorplanetcenter.net/cgi-bin/uncertaintymap.cgi".to_string()
}

fn default_ephemeris_url() -> String {
    "https://cgi.minorplanetcenter.net/cgi-bin/confirmeph2.cgi".to_string()
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            neocp_url: default_neocp_url(),
            uncertainty_url: default_uncertainty_url(),
            ephemeris_url: default_ephemeris_url(),
        }
    }
}
