//! Angle conversions between the device's radians and the hours / degrees
//! used by callers.

use std::f64::consts::PI;

/// Convert an angle in radians to hours (12h = π).
pub fn radians_to_hours(radians: f64) -> f64 {
    radians * 12.0 / PI
}

/// Convert an angle in radians to degrees.
pub fn radians_to_degrees(radians: f64) -> f64 {
    radians.to_degrees()
}

/// Convert hours of right ascension to radians.
pub fn hours_to_radians(hours: f64) -> f64 {
    hours * PI / 12.0
}

/// Convert degrees to radians.
pub fn degrees_to_radians(degrees: f64) -> f64 {
    degrees.to_radians()
}
