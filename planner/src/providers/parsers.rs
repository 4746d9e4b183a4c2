//! Parsers for the confirmation-list JSON and the ephemeris text pages.
//!
//! Both are lenient at the record level: a malformed entry or row is logged
//! and skipped, only a wholly unusable response is an error.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::error::{ProviderError, ProviderResult};
use super::types::{EphemerisSample, FeedEntry};
use crate::models::parse_timestamp;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse the NEOCP JSON list. `now` anchors year-less `Updated` strings.
pub fn parse_feed(json: &str, now: DateTime<Utc>) -> ProviderResult<Vec<FeedEntry>> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let entries = value
        .as_array()
        .ok_or_else(|| ProviderError::Parse("candidate list is not a JSON array".to_string()))?;

    let mut parsed = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        match parse_feed_entry(entry, now) {
            Ok(e) => parsed.push(e),
            Err(reason) => log::warn!("Skipping feed entry #{}: {}", idx, reason),
        }
    }
    Ok(parsed)
}

fn number(entry: &Value, key: &str) -> Option<f64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build one feed entry; the designation is the only mandatory field.
pub fn parse_feed_entry(entry: &Value, now: DateTime<Utc>) -> Result<FeedEntry, String> {
    let designation = text(entry, "Temp_Desig").ok_or("missing Temp_Desig")?;
    if designation.contains(char::is_whitespace) {
        return Err(format!("designation '{}' contains whitespace", designation));
    }

    let discovery_datetime = match (
        number(entry, "Discovery_year"),
        number(entry, "Discovery_month"),
        number(entry, "Discovery_day"),
    ) {
        (Some(y), Some(m), Some(d)) => Some(
            fractional_date(y as i32, m as u32, d)
                .ok_or_else(|| format!("invalid discovery date {} {} {}", y, m, d))?,
        ),
        _ => None,
    };

    let reference_year = discovery_datetime.map(|d| d.year()).unwrap_or(now.year());
    let updated = match text(entry, "Updated") {
        Some(raw) => Some(
            parse_updated(&raw, reference_year, now)
                .ok_or_else(|| format!("unparseable Updated '{}'", raw))?,
        ),
        None => None,
    };

    let ra = number(entry, "R.A.");
    if let Some(ra) = ra {
        if !(0.0..24.0).contains(&ra) {
            return Err(format!("R.A. {} outside [0, 24)", ra));
        }
    }
    let dec = number(entry, "Decl.");
    if let Some(dec) = dec {
        if !(-90.0..=90.0).contains(&dec) {
            return Err(format!("Decl. {} outside [-90, 90]", dec));
        }
    }

    Ok(FeedEntry {
        designation,
        score: number(entry, "Score"),
        discovery_datetime,
        ra,
        dec,
        vmag: number(entry, "V"),
        updated,
        note: text(entry, "Note"),
        num_obs: number(entry, "NObs").map(|n| n as i32),
        arc_length: number(entry, "Arc"),
        hmag: number(entry, "H"),
        not_seen_days: number(entry, "Not_Seen_dys"),
    })
}

/// `(year, month, day.fraction)` as a UTC instant, rounded to the second.
pub fn fractional_date(year: i32, month: u32, day: f64) -> Option<DateTime<Utc>> {
    if !(1.0..32.0).contains(&day) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day.floor() as u32)?;
    let seconds = (day.fract() * 86400.0).round() as i64;
    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    Some(midnight + Duration::seconds(seconds))
}

/// Accepts `Updated Oct. 19.12 UT`, `Oct. 19.12 UT` or a canonical timestamp.
fn parse_updated(raw: &str, reference_year: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(t) = parse_timestamp(raw) {
        return Some(t);
    }

    let tokens: Vec<&str> = raw
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("updated") && !t.eq_ignore_ascii_case("ut"))
        .collect();
    let [month, day] = tokens.as_slice() else {
        return None;
    };
    let month_key = month.trim_end_matches('.').to_lowercase();
    let month = MONTHS
        .iter()
        .position(|m| month_key.starts_with(m))
        .map(|i| i as u32 + 1)?;
    let day: f64 = day.parse().ok()?;

    let candidate = fractional_date(reference_year, month, day)?;
    // A December update read in early January belongs to the previous year.
    if candidate > now + Duration::days(1) {
        fractional_date(reference_year - 1, month, day)
    } else {
        Some(candidate)
    }
}

/// Parse an ephemeris page into samples, in time order.
pub fn parse_ephemeris(page: &str) -> ProviderResult<Vec<EphemerisSample>> {
    let mut samples: Vec<EphemerisSample> = page.lines().filter_map(parse_ephemeris_row).collect();

    if samples.is_empty() {
        let lower = page.to_lowercase();
        if lower.contains("not observable") || lower.contains("no ephemeris") {
            return Err(ProviderError::NotObservable(
                first_meaningful_line(page).unwrap_or_default(),
            ));
        }
        return Err(ProviderError::Parse("no ephemeris rows found".to_string()));
    }

    samples.sort_by_key(|s| s.time);
    samples.dedup_by_key(|s| s.time);
    Ok(samples)
}

fn first_meaningful_line(page: &str) -> Option<String> {
    page.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// `YYYY MM DD HHMM  RAh RAm RAs  ±DD MM SS  elong  V  dRA dDec ...`
///
/// Motions on the page are arcsec/minute and come back as arcsec/second.
pub fn parse_ephemeris_row(line: &str) -> Option<EphemerisSample> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 14 || tokens[0].len() != 4 || tokens[3].len() != 4 {
        return None;
    }

    let year: i32 = tokens[0].parse().ok()?;
    let month: u32 = tokens[1].parse().ok()?;
    let day: u32 = tokens[2].parse().ok()?;
    let hhmm: u32 = tokens[3].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hhmm / 100, hhmm % 100, 0)?;
    let time = NaiveDateTime::and_utc(&naive);

    let ra_h: f64 = tokens[4].parse().ok()?;
    let ra_m: f64 = tokens[5].parse().ok()?;
    let ra_s: f64 = tokens[6].parse().ok()?;
    let ra_deg = (ra_h + ra_m / 60.0 + ra_s / 3600.0) * 15.0;

    let dec_negative = tokens[7].starts_with('-');
    let dec_d: f64 = tokens[7].trim_start_matches(['+', '-']).parse().ok()?;
    let dec_m: f64 = tokens[8].parse().ok()?;
    let dec_s: f64 = tokens[9].parse().ok()?;
    let dec_abs = dec_d + dec_m / 60.0 + dec_s / 3600.0;
    let dec_deg = if dec_negative { -dec_abs } else { dec_abs };

    // tokens[10] is the solar elongation; unused.
    let vmag = tokens[11].parse().ok();
    let d_ra: f64 = tokens[12].parse().ok()?;
    let d_dec: f64 = tokens[13].parse().ok()?;

    if !(0.0..360.0).contains(&ra_deg) || !(-90.0..=90.0).contains(&dec_deg) {
        return None;
    }

    Some(EphemerisSample {
        time,
        ra_deg,
        dec_deg,
        vmag,
        d_ra: d_ra / 60.0,
        d_dec: d_dec / 60.0,
    })
}
