//! Records exchanged with the external data sources.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One row of the confirmation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub designation: String,
    pub score: Option<f64>,
    pub discovery_datetime: Option<DateTime<Utc>>,
    /// Hours
    pub ra: Option<f64>,
    /// Degrees
    pub dec: Option<f64>,
    pub vmag: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub num_obs: Option<i32>,
    /// Days
    pub arc_length: Option<f64>,
    pub hmag: Option<f64>,
    pub not_seen_days: Option<f64>,
}

impl FeedEntry {
    /// An entry with only the designation set.
    pub fn new(designation: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            score: None,
            discovery_datetime: None,
            ra: None,
            dec: None,
            vmag: None,
            updated: None,
            note: None,
            num_obs: None,
            arc_length: None,
            hmag: None,
            not_seen_days: None,
        }
    }
}

/// One ephemeris sample. Motions are arcsec per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EphemerisSample {
    pub time: DateTime<Utc>,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub vmag: Option<f64>,
    pub d_ra: f64,
    pub d_dec: f64,
}

impl EphemerisSample {
    /// RA rate in arcsec per minute, the unit stored on candidates.
    pub fn d_ra_per_minute(&self) -> f64 {
        self.d_ra * 60.0
    }

    pub fn d_dec_per_minute(&self) -> f64 {
        self.d_dec * 60.0
    }
}

/// Sampling step of an ephemeris request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EphemCadence {
    OneMinute,
    TenMinutes,
    ThirtyMinutes,
    OneHour,
}

impl EphemCadence {
    /// Map the `ephem_interval` option (0..=3) to a cadence.
    pub fn from_option(option: u8) -> Option<Self> {
        match option {
            0 => Some(EphemCadence::OneMinute),
            1 => Some(EphemCadence::TenMinutes),
            2 => Some(EphemCadence::ThirtyMinutes),
            3 => Some(EphemCadence::OneHour),
            _ => None,
        }
    }

    /// Interval code understood by the MPC ephemeris service (`3 - option`).
    pub fn mpc_code(&self) -> u8 {
        match self {
            EphemCadence::OneMinute => 3,
            EphemCadence::TenMinutes => 2,
            EphemCadence::ThirtyMinutes => 1,
            EphemCadence::OneHour => 0,
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            EphemCadence::OneMinute => Duration::minutes(1),
            EphemCadence::TenMinutes => Duration::minutes(10),
            EphemCadence::ThirtyMinutes => Duration::minutes(30),
            EphemCadence::OneHour => Duration::hours(1),
        }
    }
}

/// Parameters of one ephemeris block request.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemerisRequest {
    pub designation: String,
    pub start: DateTime<Utc>,
    pub cadence: EphemCadence,
    /// Degrees; the service omits rows below it.
    pub altitude_limit: f64,
    pub obs_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_option_mapping() {
        for option in 0..=3u8 {
            let cadence = EphemCadence::from_option(option).unwrap();
            assert_eq!(cadence.mpc_code(), 3 - option);
        }
        assert!(EphemCadence::from_option(4).is_none());
        assert_eq!(EphemCadence::OneMinute.step(), Duration::minutes(1));
    }
}
