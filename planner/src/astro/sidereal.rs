//! Sidereal time and hour angle at the site.

use chrono::{DateTime, Utc};
use qtty::{Degrees, Radians};

use crate::models::{ModifiedJulianDate, Site};

/// MJD of J2000.0 (2000-01-01 12:00 TT, treated as UT here).
const T2000: f64 = 51544.5;

/// Ratio of sidereal day to solar day.
const RAP: f64 = 1.00273790934;

/// Apparent motion of a fixed RA through the hour-angle frame, deg per hour.
pub const SIDEREAL_RATE_DEG_PER_HOUR: f64 = 15.041068640;

/// Greenwich mean sidereal time for an MJD (UT1 ≈ UTC), in `[0, 360)`.
pub fn gmst(mjd: ModifiedJulianDate) -> Degrees {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    let tjm = mjd.value();
    let t = (tjm.floor() - T2000) / 36525.0;

    // GMST at 0h UT1, seconds of a day converted to a fraction of a turn
    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) / 86400.0;
    let turns = gmst0 + tjm.fract() * RAP;

    Radians::new(turns * std::f64::consts::TAU)
        .to::<qtty::Degree>()
        .wrap_pos()
}

/// Local mean sidereal time at `site` (east-positive longitude).
pub fn local_sidereal_time(site: &Site, t: DateTime<Utc>) -> Degrees {
    (gmst(ModifiedJulianDate::from_datetime(t)) + Degrees::new(site.longitude)).wrap_pos()
}

/// `HA = LST − RA`, wrapped to `(-180, 180]`.
pub fn hour_angle(lst: Degrees, ra: Degrees) -> Degrees {
    (lst - ra).wrap_signed()
}

/// Hour angle of `ra` seen from `site` at `t`.
pub fn hour_angle_at(site: &Site, ra: Degrees, t: DateTime<Utc>) -> Degrees {
    hour_angle(local_sidereal_time(site, t), ra)
}

/// Altitude above the horizon of a fixed (ra, dec) at `t`.
pub fn altitude(site: &Site, ra: Degrees, dec: Degrees, t: DateTime<Utc>) -> Degrees {
    let lat = Degrees::new(site.latitude);
    let ha = hour_angle_at(site, ra, t);
    let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos();
    Radians::new(sin_alt.clamp(-1.0, 1.0).asin()).to::<qtty::Degree>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qtty::Radian;

    #[test]
    fn test_gmst_reference_value() {
        let g = gmst(ModifiedJulianDate::from(57028.478514610404));
        assert!((g.to::<Radian>().value() - 4.851925725092499).abs() < 1e-9);
    }

    #[test]
    fn test_hour_angle_wraps() {
        let ha = hour_angle(Degrees::new(10.0), Degrees::new(350.0));
        assert!((ha.value() - 20.0).abs() < 1e-12);
        let ha = hour_angle(Degrees::new(350.0), Degrees::new(10.0));
        assert!((ha.value() + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_lst_advances_at_sidereal_rate() {
        let site = Site::tmo();
        let t0 = Utc.with_ymd_and_hms(2024, 10, 19, 4, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(1);
        let d = (local_sidereal_time(&site, t1) - local_sidereal_time(&site, t0))
            .wrap_pos()
            .value();
        assert!((d - SIDEREAL_RATE_DEG_PER_HOUR).abs() < 1e-6);
    }

    #[test]
    fn test_altitude_on_meridian() {
        let site = Site::tmo();
        let t = Utc.with_ymd_and_hms(2024, 10, 19, 4, 0, 0).unwrap();
        let ra = local_sidereal_time(&site, t);
        let alt = altitude(&site, ra, Degrees::new(site.latitude), t);
        assert!((alt.value() - 90.0).abs() < 1e-5);
    }
}
