//! Conversions between the decoder clock and seconds.
//!
//! Decoder timestamps (pts) are integer microseconds. `timestamp` and
//! `systime` are floating point seconds.

/// Microseconds per second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert microseconds to seconds.
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SECOND as f64
}

/// Convert seconds to microseconds, rounding to the nearest microsecond.
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * MICROS_PER_SECOND as f64).round() as i64
}

/// Wall-clock seconds for a pts given the source clock offset.
pub fn systime_secs(pts: i64, clock_offset: i64) -> f64 {
    micros_to_secs(pts + clock_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(micros_to_secs(40_000), 0.04);
        assert_eq!(secs_to_micros(0.04), 40_000);
        assert_eq!(secs_to_micros(-1.5), -1_500_000);
        assert_eq!(systime_secs(250_000, 1_448_984_844_000_000), 1_448_984_844.25);
    }
}
