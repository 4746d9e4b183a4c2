use serde::{Deserialize, Serialize};

/// Observatory location. Longitude is east-positive degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level
    pub elevation: f64,
    /// IANA name; informational only, all computation is UTC.
    pub timezone: String,
    /// Minutes after sunset before observing starts
    pub twilight_offset_minutes: i64,
    /// MPC observatory code used in ephemeris requests
    pub obs_code: String,
}

impl Site {
    /// Table Mountain Observatory, MPC code 654.
    pub fn tmo() -> Self {
        Self {
            latitude: 34.36,
            longitude: -117.63,
            elevation: 2286.0,
            timezone: "America/Los_Angeles".to_string(),
            twilight_offset_minutes: 0,
            obs_code: "654".to_string(),
        }
    }
}
