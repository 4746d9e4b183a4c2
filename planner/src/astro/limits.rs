//! Mechanical hour-angle envelope of the mount.
//!
//! Declination bands are half-open `[lo, hi)`. Bands whose limits are
//! `(0, 0)` are closed: nothing there is observable.

use qtty::Degrees;

/// `(dec_lo, dec_hi, ha_min, ha_max)` in degrees.
const HA_LIMITS: [(f64, f64, f64, f64); 13] = [
    (-38.0, -36.0, 0.0, 0.0),
    (-36.0, -34.0, -35.0, 42.6104),
    (-34.0, -32.0, -35.0, 45.9539),
    (-32.0, -30.0, -35.0, 48.9586),
    (-30.0, -28.0, -35.0, 51.6945),
    (-28.0, -26.0, -35.0, 54.2121),
    (-26.0, -24.0, -35.0, 56.5487),
    (-24.0, -22.0, -35.0, 58.7332),
    (-22.0, 0.0, -35.0, 60.0),
    (0.0, 46.0, -52.5, 60.0),
    (46.0, 56.0, -37.5, 60.0),
    (56.0, 66.0, -30.0, 60.0),
    (66.0, 74.0, 0.0, 0.0),
];

/// Allowed hour-angle range for a declination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaLimits {
    pub min: Degrees,
    pub max: Degrees,
}

impl HaLimits {
    pub fn contains(&self, ha: Degrees) -> bool {
        self.min <= ha && ha <= self.max
    }
}

/// Limits for `dec`, or `None` when the mount cannot reach it at any HA.
pub fn ha_limits(dec: Degrees) -> Option<HaLimits> {
    let d = dec.value();
    HA_LIMITS
        .iter()
        .find(|(lo, hi, _, _)| *lo <= d && d < *hi)
        .filter(|(_, _, min, max)| min < max)
        .map(|&(_, _, min, max)| HaLimits {
            min: Degrees::new(min),
            max: Degrees::new(max),
        })
}

/// True when `(ha, dec)` is inside the envelope.
pub fn is_reachable(ha: Degrees, dec: Degrees) -> bool {
    ha_limits(dec).is_some_and(|l| l.contains(ha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_edges() {
        assert!(ha_limits(Degrees::new(-38.0)).is_none());
        assert!(ha_limits(Degrees::new(-38.5)).is_none());
        let l = ha_limits(Degrees::new(-36.0)).unwrap();
        assert_eq!(l.min.value(), -35.0);
        assert_eq!(l.max.value(), 42.6104);
        assert!(ha_limits(Degrees::new(74.0)).is_none());
        assert!(ha_limits(Degrees::new(66.0)).is_none());
        assert!(ha_limits(Degrees::new(65.999)).is_some());
    }

    #[test]
    fn test_half_open_bands() {
        assert_eq!(ha_limits(Degrees::new(-30.0)).unwrap().max.value(), 51.6945);
        assert_eq!(ha_limits(Degrees::new(-30.0001)).unwrap().max.value(), 48.9586);
        assert_eq!(ha_limits(Degrees::new(0.0)).unwrap().min.value(), -52.5);
        assert_eq!(ha_limits(Degrees::new(-0.0001)).unwrap().min.value(), -35.0);
    }

    #[test]
    fn test_reachability() {
        assert!(is_reachable(Degrees::new(0.0), Degrees::new(30.0)));
        assert!(is_reachable(Degrees::new(60.0), Degrees::new(30.0)));
        assert!(!is_reachable(Degrees::new(60.1), Degrees::new(30.0)));
        assert!(!is_reachable(Degrees::new(-52.6), Degrees::new(30.0)));
    }
}
