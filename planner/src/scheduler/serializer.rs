//! Pipe-delimited schedule file.
//!
//! ```text
//! DateTime|Occupied|Target|Move|RA|Dec|ExposureTime|#Exposure|Filter|Description
//! 2024-10-19T04:12:00.000|1|P21abcd_1|1|180.000000|30.000000|600.0|1.0|CLEAR|'MPC Asteroid ...'
//! 2024-10-19T05:02:00.000|1|Focus|0|0|0|0|0|CLEAR|'Refocusing'
//! ```
//!
//! Lines starting with `#` are comments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use qtty::Degrees;

use crate::astro::{format_dms, format_hms};

pub const HEADER: &str =
    "DateTime|Occupied|Target|Move|RA|Dec|ExposureTime|#Exposure|Filter|Description";

/// Millisecond ISO form used in the `DateTime` column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub const FOCUS_TARGET: &str = "Focus";
const FOCUS_DESCRIPTION: &str = "Refocusing";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleParseError {
    #[error("expected 10 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid DateTime '{0}'")]
    DateTime(String),
    #[error("invalid {field} '{value}'")]
    Field { field: &'static str, value: String },
    #[error("description must be single-quoted: {0}")]
    Description(String),
}

/// One observation row.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationLine {
    pub datetime: DateTime<Utc>,
    pub occupied: bool,
    /// Target with visit suffix
    pub target: String,
    /// A slew precedes this observation.
    pub slew: bool,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub exposure_time: f64,
    pub num_exposures: f64,
    pub filter: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleLine {
    Observation(ObservationLine),
    Focus { datetime: DateTime<Utc> },
}

impl ScheduleLine {
    pub fn datetime(&self) -> DateTime<Utc> {
        match self {
            ScheduleLine::Observation(line) => line.datetime,
            ScheduleLine::Focus { datetime } => *datetime,
        }
    }

    /// Parse one line of the body (not the header, not a comment).
    pub fn parse(line: &str) -> Result<Self, ScheduleParseError> {
        let fields: Vec<&str> = line.splitn(10, '|').collect();
        if fields.len() != 10 {
            return Err(ScheduleParseError::FieldCount(fields.len()));
        }

        let datetime = NaiveDateTime::parse_from_str(fields[0], DATETIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| ScheduleParseError::DateTime(fields[0].to_string()))?;

        if fields[2] == FOCUS_TARGET {
            return Ok(ScheduleLine::Focus { datetime });
        }

        let description = fields[9]
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .ok_or_else(|| ScheduleParseError::Description(fields[9].to_string()))?;

        Ok(ScheduleLine::Observation(ObservationLine {
            datetime,
            occupied: flag("Occupied", fields[1])?,
            target: fields[2].to_string(),
            slew: flag("Move", fields[3])?,
            ra_deg: number("RA", fields[4])?,
            dec_deg: number("Dec", fields[5])?,
            exposure_time: number("ExposureTime", fields[6])?,
            num_exposures: number("#Exposure", fields[7])?,
            filter: fields[8].to_string(),
            description: description.to_string(),
        }))
    }
}

fn flag(field: &'static str, value: &str) -> Result<bool, ScheduleParseError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ScheduleParseError::Field {
            field,
            value: value.to_string(),
        }),
    }
}

fn number(field: &'static str, value: &str) -> Result<f64, ScheduleParseError> {
    value.parse().map_err(|_| ScheduleParseError::Field {
        field,
        value: value.to_string(),
    })
}

fn bit(b: bool) -> u8 {
    u8::from(b)
}

impl fmt::Display for ScheduleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleLine::Focus { datetime } => write!(
                f,
                "{}|1|{}|0|0|0|0|0|CLEAR|'{}'",
                datetime.format(DATETIME_FORMAT),
                FOCUS_TARGET,
                FOCUS_DESCRIPTION
            ),
            ScheduleLine::Observation(line) => write!(
                f,
                "{}|{}|{}|{}|{:.6}|{:.6}|{:.1}|{:.1}|{}|'{}'",
                line.datetime.format(DATETIME_FORMAT),
                bit(line.occupied),
                line.target,
                bit(line.slew),
                line.ra_deg,
                line.dec_deg,
                line.exposure_time,
                line.num_exposures,
                line.filter,
                line.description
            ),
        }
    }
}

impl FromStr for ScheduleLine {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScheduleLine::parse(s)
    }
}

/// Description of an MPC confirmation target.
pub fn mpc_description(
    designation: &str,
    time: DateTime<Utc>,
    ra_deg: f64,
    dec_deg: f64,
    d_ra: Option<f64>,
    d_dec: Option<f64>,
) -> String {
    format!(
        "MPC Asteroid {}, UT: {}, RA: {}, DEC: {}, dRA: {:.2}\"/min, dDEC: {:.2}\"/min",
        designation,
        time.format("%H%M"),
        format_hms(Degrees::new(ra_deg)),
        format_dms(Degrees::new(dec_deg)),
        d_ra.unwrap_or(0.0),
        d_dec.unwrap_or(0.0)
    )
}

/// Header, then one line per entry; an empty body gets a `#` diagnostic.
pub fn render(lines: &[ScheduleLine], diagnostic: &str) -> String {
    let mut out = String::with_capacity(64 * (lines.len() + 2));
    out.push_str(HEADER);
    out.push('\n');
    if lines.is_empty() {
        out.push_str("# ");
        out.push_str(diagnostic);
        out.push('\n');
    }
    for line in lines {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

/// Parse a schedule file, skipping the header, blank and `#` lines.
pub fn parse_schedule(text: &str) -> Result<Vec<ScheduleLine>, ScheduleParseError> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && *l != HEADER)
        .map(ScheduleLine::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, 4, 12, 0).unwrap()
    }

    #[test]
    fn test_focus_line() {
        let line = ScheduleLine::Focus { datetime: t() };
        assert_eq!(
            line.to_string(),
            "2024-10-19T04:12:00.000|1|Focus|0|0|0|0|0|CLEAR|'Refocusing'"
        );
        assert_eq!(ScheduleLine::parse(&line.to_string()).unwrap(), line);
    }

    #[test]
    fn test_observation_line() {
        let line = ScheduleLine::Observation(ObservationLine {
            datetime: t(),
            occupied: true,
            target: "P21abcd_1".to_string(),
            slew: true,
            ra_deg: 180.0,
            dec_deg: -30.5,
            exposure_time: 600.0,
            num_exposures: 1.0,
            filter: "CLEAR".to_string(),
            description: mpc_description("P21abcd", t(), 180.0, -30.5, Some(1.5), None),
        });
        let text = line.to_string();
        assert!(text.starts_with(
            "2024-10-19T04:12:00.000|1|P21abcd_1|1|180.000000|-30.500000|600.0|1.0|CLEAR|'MPC Asteroid P21abcd, UT: 0412,"
        ));
        assert!(text.ends_with("dRA: 1.50\"/min, dDEC: 0.00\"/min'"));
        assert_eq!(ScheduleLine::parse(&text).unwrap().to_string(), text);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ScheduleLine::parse("a|b"),
            Err(ScheduleParseError::FieldCount(2))
        );
        assert!(matches!(
            ScheduleLine::parse("2024-10-19 04:12:00|1|X_1|0|1|2|3|4|CLEAR|'d'"),
            Err(ScheduleParseError::DateTime(_))
        ));
        assert!(matches!(
            ScheduleLine::parse("2024-10-19T04:12:00.000|2|X_1|0|1|2|3|4|CLEAR|'d'"),
            Err(ScheduleParseError::Field { field: "Occupied", .. })
        ));
        assert!(matches!(
            ScheduleLine::parse("2024-10-19T04:12:00.000|1|X_1|0|1|2|3|4|CLEAR|d"),
            Err(ScheduleParseError::Description(_))
        ));
    }

    #[test]
    fn test_render_empty_and_parse_back() {
        let text = render(&[], "no feasible candidates");
        assert_eq!(text, format!("{}\n# no feasible candidates\n", HEADER));
        assert!(parse_schedule(&text).unwrap().is_empty());

        let lines = vec![ScheduleLine::Focus { datetime: t() }];
        let text = render(&lines, "unused");
        assert_eq!(parse_schedule(&text).unwrap(), lines);
    }
}
