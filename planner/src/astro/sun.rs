//! Low-precision Sun position and the night it bounds.
//!
//! Uses the Astronomical Almanac's short series (good to ~0.01° over
//! 1950–2050), which is far below the one-second timing we need.

use chrono::{DateTime, Duration, Utc};
use qtty::{Degrees, Radians};

use super::sidereal::altitude;
use crate::models::{ModifiedJulianDate, Period, Site};

/// Sun altitude at sunset/sunrise, refraction and semidiameter included.
pub const SUNSET_ALTITUDE_DEG: f64 = -0.833;

/// Observing stops this many minutes before sunrise.
pub const SUNRISE_MARGIN_MINUTES: i64 = 60;

const JD_MJD_OFFSET: f64 = 2_400_000.5;
const J2000_JD: f64 = 2_451_545.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NightError {
    #[error("no sunset/sunrise pair found around {0}")]
    NoNight(DateTime<Utc>),
    #[error("night starting {sunset} leaves no observing time after offsets")]
    EmptyWindow { sunset: DateTime<Utc> },
}

/// Apparent equatorial coordinates of the Sun at `t`.
pub fn sun_position(t: DateTime<Utc>) -> (Degrees, Degrees) {
    let jd = ModifiedJulianDate::from_datetime(t).value() + JD_MJD_OFFSET;
    let n = jd - J2000_JD;

    let mean_longitude = Degrees::new(280.460 + 0.985_647_4 * n).wrap_pos();
    let mean_anomaly = Degrees::new(357.528 + 0.985_600_3 * n).wrap_pos();
    let ecliptic_longitude = mean_longitude
        + Degrees::new(1.915 * mean_anomaly.sin() + 0.020 * Degrees::new(2.0 * mean_anomaly.value()).sin());
    let obliquity = Degrees::new(23.439 - 0.000_000_4 * n);

    let (sin_l, cos_l) = ecliptic_longitude.sin_cos();
    let ra = Radians::new((obliquity.cos() * sin_l).atan2(cos_l))
        .to::<qtty::Degree>()
        .wrap_pos();
    let dec = Radians::new((obliquity.sin() * sin_l).asin()).to::<qtty::Degree>();
    (ra, dec)
}

/// Altitude of the Sun above the horizon at `site`.
pub fn sun_altitude(site: &Site, t: DateTime<Utc>) -> Degrees {
    let (ra, dec) = sun_position(t);
    altitude(site, ra, dec, t)
}

/// One night at the site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NightWindow {
    pub sunset: DateTime<Utc>,
    pub sunrise: DateTime<Utc>,
    /// δ: delay after sunset before observing.
    pub twilight_offset: Duration,
}

impl NightWindow {
    /// The night in progress at `now`, or the next one if it is daytime.
    pub fn around(site: &Site, now: DateTime<Utc>) -> Result<Self, NightError> {
        let crossings = find_crossings(site, now - Duration::hours(16), now + Duration::hours(40));

        let mut last_sunset = None;
        for (t, rising) in crossings {
            match (rising, last_sunset) {
                (false, _) => last_sunset = Some(t),
                (true, Some(sunset)) if t > now => {
                    return Ok(Self {
                        sunset,
                        sunrise: t,
                        twilight_offset: Duration::minutes(site.twilight_offset_minutes),
                    });
                }
                _ => {}
            }
        }
        Err(NightError::NoNight(now))
    }

    /// `[sunset + δ, sunrise − 1 h]`.
    pub fn observing_window(&self) -> Result<Period, NightError> {
        Period::new(
            self.sunset + self.twilight_offset,
            self.sunrise - Duration::minutes(SUNRISE_MARGIN_MINUTES),
        )
        .ok_or(NightError::EmptyWindow {
            sunset: self.sunset,
        })
    }
}

/// All horizon crossings in `[from, to]`: `(time, rising)`.
fn find_crossings(site: &Site, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<(DateTime<Utc>, bool)> {
    let f = |t: DateTime<Utc>| sun_altitude(site, t).value() - SUNSET_ALTITUDE_DEG;
    let step = Duration::minutes(1);

    let mut crossings = Vec::new();
    let mut t_prev = from;
    let mut f_prev = f(from);
    while t_prev < to {
        let t_next = t_prev + step;
        let f_next = f(t_next);
        if (f_prev < 0.0) != (f_next < 0.0) {
            crossings.push((bisect(&f, t_prev, t_next), f_next >= 0.0));
        }
        t_prev = t_next;
        f_prev = f_next;
    }
    crossings
}

/// Refine a sign change of `f` on `[lo, hi]` to one second.
fn bisect<F>(f: &F, mut lo: DateTime<Utc>, mut hi: DateTime<Utc>) -> DateTime<Utc>
where
    F: Fn(DateTime<Utc>) -> f64,
{
    let below_at_lo = f(lo) < 0.0;
    while hi - lo > Duration::seconds(1) {
        let mid = lo + (hi - lo) / 2;
        if (f(mid) < 0.0) == below_at_lo {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sun_position_at_equinox() {
        // Near the March equinox the Sun sits close to RA 0, Dec 0.
        let (ra, dec) = sun_position(Utc.with_ymd_and_hms(2024, 3, 20, 3, 6, 0).unwrap());
        assert!(dec.value().abs() < 0.05);
        assert!(ra.value() < 0.1 || ra.value() > 359.9);
    }

    #[test]
    fn test_night_around_midnight() {
        let site = Site::tmo();
        // 2024-10-19 08:00 UTC is ~01:00 local time at TMO.
        let now = Utc.with_ymd_and_hms(2024, 10, 19, 8, 0, 0).unwrap();
        let night = NightWindow::around(&site, now).unwrap();
        assert!(night.sunset < now && now < night.sunrise);
        let length = night.sunrise - night.sunset;
        assert!(length > Duration::hours(11) && length < Duration::hours(14));
        // Sunset near 01:10 UTC, sunrise near 14:00 UTC
        assert!(night.sunset > Utc.with_ymd_and_hms(2024, 10, 19, 0, 30, 0).unwrap());
        assert!(night.sunrise < Utc.with_ymd_and_hms(2024, 10, 19, 14, 40, 0).unwrap());
    }

    #[test]
    fn test_daytime_gives_next_night() {
        let site = Site::tmo();
        let now = Utc.with_ymd_and_hms(2024, 10, 19, 20, 0, 0).unwrap();
        let night = NightWindow::around(&site, now).unwrap();
        assert!(night.sunset > now);
        let window = night.observing_window().unwrap();
        assert_eq!(window.end, night.sunrise - Duration::hours(1));
    }

    #[test]
    fn test_crossing_precision() {
        let site = Site::tmo();
        let now = Utc.with_ymd_and_hms(2024, 10, 19, 8, 0, 0).unwrap();
        let night = NightWindow::around(&site, now).unwrap();
        let before = sun_altitude(&site, night.sunset - Duration::seconds(2)).value();
        let after = sun_altitude(&site, night.sunset + Duration::seconds(2)).value();
        assert!(before > SUNSET_ALTITUDE_DEG && after < SUNSET_ALTITUDE_DEG);
    }
}
