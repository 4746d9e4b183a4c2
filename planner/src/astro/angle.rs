//! Angle ingress and formatting.
//!
//! All angles inside the planner are decimal degrees (`qtty::Degrees`). This
//! module accepts the shapes external data arrives in and writes the
//! sexagesimal forms used in schedule descriptions.

use qtty::{Degrees, HourAngles};

/// Error returned when an angle cannot be interpreted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AngleError {
    #[error("angle is not a finite number: {0}")]
    NotFinite(f64),
    #[error("cannot parse angle '{0}'")]
    Unparseable(String),
    #[error("minutes and seconds must be in [0, 60): {0}")]
    ComponentOutOfRange(String),
    #[error("declination {0} outside [-90, 90]")]
    DeclinationOutOfRange(f64),
}

/// Shapes accepted by [`ensure_angle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleInput<'a> {
    /// Decimal degrees.
    Degrees(f64),
    /// `±DD MM SS.s` or `±DD:MM:SS.s` in degrees; a bare decimal string is
    /// read as degrees too.
    Sexagesimal(&'a str),
    /// `HH MM SS.s` or `HH:MM:SS.s` in hours.
    SexagesimalHours(&'a str),
    /// `(hours, minutes, seconds)`.
    Hours(i32, u32, f64),
}

impl From<f64> for AngleInput<'_> {
    fn from(v: f64) -> Self {
        AngleInput::Degrees(v)
    }
}

impl<'a> From<&'a str> for AngleInput<'a> {
    fn from(s: &'a str) -> Self {
        AngleInput::Sexagesimal(s)
    }
}

impl From<(i32, u32, f64)> for AngleInput<'_> {
    fn from((h, m, s): (i32, u32, f64)) -> Self {
        AngleInput::Hours(h, m, s)
    }
}

/// Interpret `input` as an angle in degrees.
pub fn ensure_angle<'a>(input: impl Into<AngleInput<'a>>) -> Result<Degrees, AngleError> {
    let degrees = match input.into() {
        AngleInput::Degrees(v) => v,
        AngleInput::Sexagesimal(s) => parse_sexagesimal(s)?,
        AngleInput::SexagesimalHours(s) => parse_sexagesimal(s)? * 15.0,
        AngleInput::Hours(h, m, s) => {
            if m >= 60 || !(0.0..60.0).contains(&s) {
                return Err(AngleError::ComponentOutOfRange(format!("{} {} {}", h, m, s)));
            }
            HourAngles::from_hms(h, m, s).to::<qtty::Degree>().value()
        }
    };
    if !degrees.is_finite() {
        return Err(AngleError::NotFinite(degrees));
    }
    Ok(Degrees::new(degrees))
}

/// Decimal value of an angle in degrees.
pub fn decimal(angle: Degrees) -> f64 {
    angle.value()
}

/// Parse `±A B C` / `±A:B:C` (or a plain decimal) into `±(A + B/60 + C/3600)`.
fn parse_sexagesimal(raw: &str) -> Result<f64, AngleError> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Ok(v);
    }

    let negative = trimmed.starts_with('-');
    let body = trimmed.trim_start_matches(['-', '+']);
    let parts: Vec<&str> = body
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(AngleError::Unparseable(raw.to_string()));
    }

    let mut values = [0.0_f64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| AngleError::Unparseable(raw.to_string()))?;
        if *slot < 0.0 {
            return Err(AngleError::Unparseable(raw.to_string()));
        }
    }
    if values[1] >= 60.0 || values[2] >= 60.0 {
        return Err(AngleError::ComponentOutOfRange(raw.to_string()));
    }

    let magnitude = values[0] + values[1] / 60.0 + values[2] / 3600.0;
    Ok(if negative { -magnitude } else { magnitude })
}

/// RA normalized to `[0, 360)`.
pub fn normalize_ra(ra: Degrees) -> Degrees {
    ra.wrap_pos()
}

/// Dec checked against `[-90, 90]`.
pub fn checked_dec(dec: Degrees) -> Result<Degrees, AngleError> {
    if (-90.0..=90.0).contains(&dec.value()) {
        Ok(dec)
    } else {
        Err(AngleError::DeclinationOutOfRange(dec.value()))
    }
}

/// Split a non-negative value into (whole, minutes, seconds) with the seconds
/// rounded to `decimals` places and carries propagated.
fn split_sexagesimal(value: f64, decimals: u32) -> (u64, u64, f64) {
    let scale = 10_f64.powi(decimals as i32);
    let total = (value * 3600.0 * scale).round() as u64;
    let per_minute = (60.0 * scale) as u64;
    let per_unit = 60 * per_minute;
    let whole = total / per_unit;
    let minutes = (total % per_unit) / per_minute;
    let seconds = (total % per_minute) as f64 / scale;
    (whole, minutes, seconds)
}

/// RA as `hh mm ss.ss`.
pub fn format_hms(ra: Degrees) -> String {
    let hours = normalize_ra(ra).value() / 15.0;
    let (h, m, s) = split_sexagesimal(hours, 2);
    format!("{:02} {:02} {:05.2}", h % 24, m, s)
}

/// Dec as `±dd mm ss.s`.
pub fn format_dms(dec: Degrees) -> String {
    let value = dec.value();
    let sign = if value < 0.0 { '-' } else { '+' };
    let (d, m, s) = split_sexagesimal(value.abs(), 1);
    format!("{}{:02} {:02} {:04.1}", sign, d, m, s)
}
