//! Property tests for the text formats the planner reads and writes.

use chrono::{DateTime, Duration, TimeZone, Utc};
use neo_planner::astro::angle::decimal;
use neo_planner::astro::ensure_angle;
use neo_planner::models::{format_timestamp, parse_timestamp};
use neo_planner::scheduler::{ObservationLine, ScheduleLine};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

proptest! {
    #[test]
    fn stored_timestamps_roundtrip(secs in 0i64..400_000_000) {
        let t = base() + Duration::seconds(secs);
        let text = format_timestamp(&t);
        prop_assert_eq!(text.len(), 19);
        prop_assert_eq!(parse_timestamp(&text).unwrap(), t);
    }

    #[test]
    fn decimal_degrees_pass_through(x in -1.0e6f64..1.0e6) {
        prop_assert_eq!(decimal(ensure_angle(x).unwrap()), x);
    }

    #[test]
    fn sexagesimal_components_combine(
        d in 0u32..90,
        m in 0u32..60,
        s in 0.0f64..59.99,
        negative in any::<bool>(),
    ) {
        let sign = if negative { '-' } else { '+' };
        let text = format!("{}{:02} {:02} {:05.2}", sign, d, m, s);
        let s_rounded: f64 = format!("{:05.2}", s).parse().unwrap();
        let magnitude = d as f64 + m as f64 / 60.0 + s_rounded / 3600.0;
        let expected = if negative { -magnitude } else { magnitude };
        let got = decimal(ensure_angle(text.as_str()).unwrap());
        prop_assert!((got - expected).abs() < 1e-9, "{} -> {} != {}", text, got, expected);
    }

    #[test]
    fn observation_lines_are_stable_text(
        secs in 0i64..200_000_000,
        millis in 0i64..1000,
        ra_micro in 0i64..360_000_000,
        dec_micro in -90_000_000i64..90_000_000,
        exposure in 1u32..3600,
        count in 1u32..20,
        occupied in any::<bool>(),
        slew in any::<bool>(),
        target in "[A-Za-z0-9]{1,8}_[1-9]",
        description in "[A-Za-z0-9 .:+-]{0,40}",
    ) {
        let line = ScheduleLine::Observation(ObservationLine {
            datetime: base() + Duration::seconds(secs) + Duration::milliseconds(millis),
            occupied,
            target,
            slew,
            ra_deg: ra_micro as f64 / 1e6,
            dec_deg: dec_micro as f64 / 1e6,
            exposure_time: exposure as f64,
            num_exposures: count as f64,
            filter: "CLEAR".to_string(),
            description,
        });
        let text = line.to_string();
        let parsed = ScheduleLine::parse(&text).unwrap();
        prop_assert_eq!(parsed.to_string(), text);
        prop_assert_eq!(parsed.datetime(), line.datetime());
    }
}
