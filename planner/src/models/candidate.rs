//! Observation candidates and their partial updates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::time::{serde_opt_timestamp, serde_timestamp, Period};
use crate::db::checksum::candidate_checksum;

/// Type tag of minor-planet confirmation targets.
pub const MPC_NEO: &str = "MPC-NEO";

/// Stable candidate identity: hex SHA-256 of `(name, type, author)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn compute(name: &str, candidate_type: &str, author: &str) -> Self {
        CandidateId(candidate_checksum(name, candidate_type, author))
    }

    /// Wrap an id read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CandidateId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Close-approach flag from the uncertainty map; lower rank wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApproachColor {
    Black,
    Red,
    Orange,
    Green,
}

impl ApproachColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApproachColor::Black => "BLACK",
            ApproachColor::Red => "RED",
            ApproachColor::Orange => "ORANGE",
            ApproachColor::Green => "GREEN",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            ApproachColor::Black => 0,
            ApproachColor::Red => 1,
            ApproachColor::Orange => 2,
            ApproachColor::Green => 3,
        }
    }

    /// The higher-priority (lower rank) of two colors.
    pub fn worst(self, other: ApproachColor) -> ApproachColor {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }
}

impl FromStr for ApproachColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BLACK" => Ok(ApproachColor::Black),
            "RED" => Ok(ApproachColor::Red),
            "ORANGE" => Ok(ApproachColor::Orange),
            "GREEN" => Ok(ApproachColor::Green),
            other => Err(format!("Unknown approach color: {}", other)),
        }
    }
}

/// Why the selection step turned a candidate down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectedReason {
    Observability,
    #[serde(rename = "vMag")]
    VMag,
    #[serde(rename = "RMSE")]
    Rmse,
    Incomplete,
}

impl RejectedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectedReason::Observability => "Observability",
            RejectedReason::VMag => "vMag",
            RejectedReason::Rmse => "RMSE",
            RejectedReason::Incomplete => "Incomplete",
        }
    }
}

impl fmt::Display for RejectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectedReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Observability" => Ok(RejectedReason::Observability),
            "vMag" => Ok(RejectedReason::VMag),
            "RMSE" => Ok(RejectedReason::Rmse),
            "Incomplete" => Ok(RejectedReason::Incomplete),
            other => Err(format!("Unknown rejected reason: {}", other)),
        }
    }
}

/// A target under consideration.
///
/// `ra` is in hours (0–24), `dec` in degrees, `rmse_*` in arcsec and
/// `d_ra`/`d_dec` in arcsec/minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(rename = "type")]
    pub candidate_type: String,
    pub author: String,
    #[serde(with = "serde_timestamp")]
    pub date_added: DateTime<Utc>,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub magnitude: Option<f64>,
    pub num_exposures: Option<i32>,
    pub exposure_time: Option<f64>,
    pub rmse_ra: Option<f64>,
    pub rmse_dec: Option<f64>,
    pub approach_color: Option<ApproachColor>,
    pub d_ra: Option<f64>,
    pub d_dec: Option<f64>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub transit_time: Option<DateTime<Utc>>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub start_observability: Option<DateTime<Utc>>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub end_observability: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub n_obs: Option<i32>,
    pub notes: Option<String>,
    pub rejected_reason: Option<RejectedReason>,
    pub removed_reason: Option<String>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub removed_dt: Option<DateTime<Utc>>,
    #[serde(with = "serde_opt_timestamp", default)]
    pub date_last_edited: Option<DateTime<Utc>>,
}

impl Candidate {
    /// Create a bare candidate; the id is derived from name, type and author.
    pub fn new(
        name: impl Into<String>,
        candidate_type: impl Into<String>,
        author: impl Into<String>,
        date_added: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let candidate_type = candidate_type.into();
        let author = author.into();
        Self {
            id: CandidateId::compute(&name, &candidate_type, &author),
            name,
            candidate_type,
            author,
            date_added,
            ra: None,
            dec: None,
            magnitude: None,
            num_exposures: None,
            exposure_time: None,
            rmse_ra: None,
            rmse_dec: None,
            approach_color: None,
            d_ra: None,
            d_dec: None,
            updated: None,
            transit_time: None,
            start_observability: None,
            end_observability: None,
            score: None,
            n_obs: None,
            notes: None,
            rejected_reason: None,
            removed_reason: None,
            removed_dt: None,
            date_last_edited: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_reason.is_some()
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_reason.is_some()
    }

    /// Right ascension in decimal degrees.
    pub fn ra_degrees(&self) -> Option<f64> {
        self.ra.map(|hours| hours * 15.0)
    }

    /// Stored observability window, if both ends are known and ordered.
    pub fn observability_window(&self) -> Option<Period> {
        match (self.start_observability, self.end_observability) {
            (Some(start), Some(end)) => Period::new(start, end),
            _ => None,
        }
    }

    /// Total open-shutter time of one visit.
    pub fn exposure_duration(&self) -> Option<Duration> {
        match (self.num_exposures, self.exposure_time) {
            (Some(n), Some(t)) if n > 0 && t > 0.0 => {
                Some(Duration::milliseconds((n as f64 * t * 1000.0).round() as i64))
            }
            _ => None,
        }
    }

    /// Check record invariants that the store enforces on every write.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(start), Some(end)) = (self.start_observability, self.end_observability) {
            if start >= end {
                return Err(format!(
                    "start_observability ({}) must precede end_observability ({})",
                    start, end
                ));
            }
        }
        if self.name.trim().is_empty() {
            return Err("candidate name must not be empty".to_string());
        }
        Ok(())
    }

    /// Merge the non-null fields of `update` onto this record.
    pub fn apply(&mut self, update: &CandidateUpdate) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &update.$field {
                    self.$field = Some(value.clone());
                })*
            };
        }
        merge!(
            ra,
            dec,
            magnitude,
            num_exposures,
            exposure_time,
            rmse_ra,
            rmse_dec,
            approach_color,
            d_ra,
            d_dec,
            updated,
            transit_time,
            start_observability,
            end_observability,
            score,
            n_obs,
            notes,
            rejected_reason,
        );
    }

    /// Explicitly clear one nullable field.
    pub fn clear(&mut self, field: CandidateField) {
        match field {
            CandidateField::Ra => self.ra = None,
            CandidateField::Dec => self.dec = None,
            CandidateField::Magnitude => self.magnitude = None,
            CandidateField::NumExposures => self.num_exposures = None,
            CandidateField::ExposureTime => self.exposure_time = None,
            CandidateField::RmseRa => self.rmse_ra = None,
            CandidateField::RmseDec => self.rmse_dec = None,
            CandidateField::ApproachColor => self.approach_color = None,
            CandidateField::DRa => self.d_ra = None,
            CandidateField::DDec => self.d_dec = None,
            CandidateField::Updated => self.updated = None,
            CandidateField::TransitTime => self.transit_time = None,
            CandidateField::StartObservability => self.start_observability = None,
            CandidateField::EndObservability => self.end_observability = None,
            CandidateField::Score => self.score = None,
            CandidateField::NObs => self.n_obs = None,
            CandidateField::Notes => self.notes = None,
            CandidateField::RejectedReason => self.rejected_reason = None,
        }
    }
}

/// Partial update; `None` means "leave unchanged".
///
/// Identity fields (`id`, `name`, `type`, `author`, `date_added`) and the
/// tombstone fields are not representable here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateUpdate {
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub magnitude: Option<f64>,
    pub num_exposures: Option<i32>,
    pub exposure_time: Option<f64>,
    pub rmse_ra: Option<f64>,
    pub rmse_dec: Option<f64>,
    pub approach_color: Option<ApproachColor>,
    pub d_ra: Option<f64>,
    pub d_dec: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
    pub transit_time: Option<DateTime<Utc>>,
    pub start_observability: Option<DateTime<Utc>>,
    pub end_observability: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub n_obs: Option<i32>,
    pub notes: Option<String>,
    pub rejected_reason: Option<RejectedReason>,
}

impl CandidateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == CandidateUpdate::default()
    }

    /// Fields of `desired` that are set and differ from `current`.
    pub fn diff(current: &Candidate, desired: &Candidate) -> Self {
        macro_rules! changed {
            ($field:ident) => {
                match &desired.$field {
                    Some(value) if current.$field.as_ref() != Some(value) => Some(value.clone()),
                    _ => None,
                }
            };
        }
        Self {
            ra: changed!(ra),
            dec: changed!(dec),
            magnitude: changed!(magnitude),
            num_exposures: changed!(num_exposures),
            exposure_time: changed!(exposure_time),
            rmse_ra: changed!(rmse_ra),
            rmse_dec: changed!(rmse_dec),
            approach_color: changed!(approach_color),
            d_ra: changed!(d_ra),
            d_dec: changed!(d_dec),
            updated: changed!(updated),
            transit_time: changed!(transit_time),
            start_observability: changed!(start_observability),
            end_observability: changed!(end_observability),
            score: changed!(score),
            n_obs: changed!(n_obs),
            notes: changed!(notes),
            rejected_reason: changed!(rejected_reason),
        }
    }
}

/// Nullable fields that `set_null` may clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateField {
    Ra,
    Dec,
    Magnitude,
    NumExposures,
    ExposureTime,
    RmseRa,
    RmseDec,
    ApproachColor,
    DRa,
    DDec,
    Updated,
    TransitTime,
    StartObservability,
    EndObservability,
    Score,
    NObs,
    Notes,
    RejectedReason,
}

impl CandidateField {
    /// Column name in the persistent store.
    pub fn column(&self) -> &'static str {
        match self {
            CandidateField::Ra => "ra",
            CandidateField::Dec => "dec",
            CandidateField::Magnitude => "magnitude",
            CandidateField::NumExposures => "num_exposures",
            CandidateField::ExposureTime => "exposure_time",
            CandidateField::RmseRa => "rmse_ra",
            CandidateField::RmseDec => "rmse_dec",
            CandidateField::ApproachColor => "approach_color",
            CandidateField::DRa => "d_ra",
            CandidateField::DDec => "d_dec",
            CandidateField::Updated => "updated",
            CandidateField::TransitTime => "transit_time",
            CandidateField::StartObservability => "start_observability",
            CandidateField::EndObservability => "end_observability",
            CandidateField::Score => "score",
            CandidateField::NObs => "n_obs",
            CandidateField::Notes => "notes",
            CandidateField::RejectedReason => "rejected_reason",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Candidate {
        Candidate::new(
            "P21abcd",
            MPC_NEO,
            "planner",
            Utc.with_ymd_and_hms(2024, 10, 19, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_id_is_stable() {
        let a = CandidateId::compute("P21abcd", MPC_NEO, "planner");
        let b = CandidateId::compute("P21abcd", MPC_NEO, "planner");
        assert_eq!(a, b);
        assert_ne!(a, CandidateId::compute("P21abcd", MPC_NEO, "someone-else"));
        assert_eq!(sample().id, a);
    }

    #[test]
    fn test_apply_merges_only_set_fields() {
        let mut c = sample();
        c.magnitude = Some(20.0);
        c.ra = Some(12.0);
        c.apply(&CandidateUpdate {
            magnitude: Some(19.0),
            ..Default::default()
        });
        assert_eq!(c.magnitude, Some(19.0));
        assert_eq!(c.ra, Some(12.0));
    }

    #[test]
    fn test_clear_field() {
        let mut c = sample();
        c.rejected_reason = Some(RejectedReason::Rmse);
        c.clear(CandidateField::RejectedReason);
        assert!(!c.is_rejected());
    }

    #[test]
    fn test_validate_window_order() {
        let mut c = sample();
        let t = Utc.with_ymd_and_hms(2024, 10, 19, 3, 0, 0).unwrap();
        c.start_observability = Some(t);
        c.end_observability = Some(t);
        assert!(c.validate().is_err());
        c.end_observability = Some(t + Duration::hours(1));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_diff_only_reports_changes() {
        let current = {
            let mut c = sample();
            c.magnitude = Some(20.0);
            c
        };
        let mut desired = current.clone();
        assert!(CandidateUpdate::diff(&current, &desired).is_empty());
        desired.magnitude = Some(20.5);
        desired.rmse_ra = Some(3.0);
        let diff = CandidateUpdate::diff(&current, &desired);
        assert_eq!(diff.magnitude, Some(20.5));
        assert_eq!(diff.rmse_ra, Some(3.0));
        assert_eq!(diff.dec, None);
    }

    #[test]
    fn test_exposure_duration() {
        let mut c = sample();
        assert!(c.exposure_duration().is_none());
        c.num_exposures = Some(2);
        c.exposure_time = Some(600.0);
        assert_eq!(c.exposure_duration(), Some(Duration::seconds(1200)));
    }

    #[test]
    fn test_color_precedence() {
        assert_eq!(ApproachColor::Green.worst(ApproachColor::Red), ApproachColor::Red);
        assert_eq!(ApproachColor::Black.worst(ApproachColor::Orange), ApproachColor::Black);
        assert_eq!("orange".parse::<ApproachColor>().unwrap(), ApproachColor::Orange);
    }

    #[test]
    fn test_rejected_reason_strings() {
        for reason in [
            RejectedReason::Observability,
            RejectedReason::VMag,
            RejectedReason::Rmse,
            RejectedReason::Incomplete,
        ] {
            assert_eq!(reason.as_str().parse::<RejectedReason>().unwrap(), reason);
        }
    }
}
