//! Angle, time and geometry primitives.

pub mod angle;
pub mod limits;
pub mod sidereal;
pub mod sun;

pub use angle::{ensure_angle, format_dms, format_hms, AngleError, AngleInput};
pub use limits::{ha_limits, is_reachable, HaLimits};
pub use sidereal::{altitude, gmst, hour_angle, hour_angle_at, local_sidereal_time};
pub use sun::{NightError, NightWindow};
