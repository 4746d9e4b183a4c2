//! Magnitude to exposure mapping and uncertainty-map statistics.

use crate::models::ApproachColor;

/// `(vmag upper bound, exposures, seconds per exposure)`, inclusive bounds.
const EXPOSURE_TABLE: [(f64, i32, f64); 4] = [
    (19.5, 1, 300.0),
    (20.5, 1, 600.0),
    (21.0, 2, 600.0),
    (21.5, 3, 600.0),
];

/// Exposure plan for a V magnitude; `None` when the target is too faint.
pub fn exposure_for_magnitude(vmag: f64) -> Option<(i32, f64)> {
    if !vmag.is_finite() {
        return None;
    }
    EXPOSURE_TABLE
        .iter()
        .find(|(limit, _, _)| vmag <= *limit)
        .map(|&(_, n, t)| (n, t))
}

/// RMS offsets and approach flag derived from an uncertainty map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uncertainty {
    /// arcsec
    pub rmse_ra: f64,
    /// arcsec
    pub rmse_dec: f64,
    pub approach_color: ApproachColor,
    /// Number of offset pairs used.
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UncertaintyParseError {
    #[error("uncertainty map contains no offset pairs")]
    NoOffsets,
}

/// Markers in the order they are stripped; `***` before `*`, `!!` before `!`.
const MARKERS: [&str; 5] = ["***", "!!", "!", "+", "*"];

fn line_color(line: &str) -> ApproachColor {
    if line.contains("***") {
        ApproachColor::Black
    } else if line.contains("!!") {
        ApproachColor::Red
    } else if line.contains('!') {
        ApproachColor::Orange
    } else {
        ApproachColor::Green
    }
}

/// Extract the `(ra_off, dec_off)` pair of one line, if it is a data line.
fn offset_pair(line: &str) -> Option<(i64, i64)> {
    let mut cleaned = line.to_string();
    for marker in MARKERS {
        cleaned = cleaned.replace(marker, " ");
    }
    let mut tokens = cleaned.split_whitespace();
    let ra = tokens.next()?.parse().ok()?;
    let dec = tokens.next()?.parse().ok()?;
    tokens.next().is_none().then_some((ra, dec))
}

/// Parse an uncertainty map into per-axis RMS and the worst approach color.
///
/// Lines that are not exactly two integers (after marker removal) are
/// ignored, so page markup around the data is harmless.
pub fn parse_uncertainty(text: &str) -> Result<Uncertainty, UncertaintyParseError> {
    let mut sum_ra = 0.0;
    let mut sum_dec = 0.0;
    let mut samples = 0usize;
    let mut color = ApproachColor::Green;

    for line in text.lines() {
        if let Some((ra, dec)) = offset_pair(line) {
            let (ra, dec) = (ra as f64, dec as f64);
            sum_ra += ra * ra;
            sum_dec += dec * dec;
            samples += 1;
            color = color.worst(line_color(line));
        }
    }

    if samples == 0 {
        return Err(UncertaintyParseError::NoOffsets);
    }

    Ok(Uncertainty {
        rmse_ra: (sum_ra / samples as f64).sqrt(),
        rmse_dec: (sum_dec / samples as f64).sqrt(),
        approach_color: color,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(exposure_for_magnitude(19.5), Some((1, 300.0)));
        assert_eq!(exposure_for_magnitude(19.51), Some((1, 600.0)));
        assert_eq!(exposure_for_magnitude(20.5), Some((1, 600.0)));
        assert_eq!(exposure_for_magnitude(21.0), Some((2, 600.0)));
        assert_eq!(exposure_for_magnitude(21.5), Some((3, 600.0)));
        assert_eq!(exposure_for_magnitude(21.51), None);
        assert_eq!(exposure_for_magnitude(12.0), Some((1, 300.0)));
        assert_eq!(exposure_for_magnitude(f64::NAN), None);
    }

    #[test]
    fn test_markers_and_color() {
        let u = parse_uncertainty("  1  2\n !! 3 4\n  *** 5 6").unwrap();
        assert!((u.rmse_ra - (35.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((u.rmse_dec - (56.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(u.approach_color, ApproachColor::Black);
        assert_eq!(u.samples, 3);
    }

    #[test]
    fn test_orange_and_signs() {
        let u = parse_uncertainty("<pre>\n  -3 +4 !\n  3 -4\n</pre>").unwrap();
        assert!((u.rmse_ra - 3.0).abs() < 1e-12);
        assert!((u.rmse_dec - 4.0).abs() < 1e-12);
        assert_eq!(u.approach_color, ApproachColor::Orange);
    }

    #[test]
    fn test_plain_lines_are_green() {
        let u = parse_uncertainty("0 0\n").unwrap();
        assert_eq!(u.approach_color, ApproachColor::Green);
        assert_eq!(u.rmse_ra, 0.0);
    }

    #[test]
    fn test_large_offsets_stay_finite() {
        let u = parse_uncertainty("  9999999999  1\n  2 3\n").unwrap();
        let expected = ((9_999_999_999f64.powi(2) + 4.0) / 2.0).sqrt();
        assert!((u.rmse_ra - expected).abs() / expected < 1e-12);
        assert!((u.rmse_dec - 5.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(u.samples, 2);
    }

    #[test]
    fn test_no_offsets() {
        assert_eq!(
            parse_uncertainty("Object not found\n1 2 3\n"),
            Err(UncertaintyParseError::NoOffsets)
        );
    }
}
