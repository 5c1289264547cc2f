// SPDX-License-Identifier: MPL-2.0
//! Time base arithmetic for stream timestamps.
//!
//! Every stream counts time in ticks of its own rational time base. All
//! conversions between ticks and seconds go through the owning stream's
//! [`TimeBase`]; there is no global tick constant.
//!
//! Seconds are carried as `f64` (like presentation timestamps elsewhere in the
//! crate) and may be negative, since some containers start streams before zero.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Microseconds per second, the unit FFmpeg uses for container-level seeking.
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// A rational number of seconds per tick, e.g. `1/30` or `1/90000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBase {
    numerator: i32,
    denominator: i32,
}

impl TimeBase {
    /// Creates a time base of `numerator / denominator` seconds per tick.
    #[must_use]
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    #[must_use]
    pub fn numerator(self) -> i32 {
        self.numerator
    }

    #[must_use]
    pub fn denominator(self) -> i32 {
        self.denominator
    }

    /// Returns true if ticks can be converted with this time base.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Length of one tick in seconds, or zero for an invalid time base.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            f64::from(self.numerator) / f64::from(self.denominator)
        }
    }

    /// Converts a tick count to seconds.
    // Allow cast_precision_loss: stream timestamps stay far below 2^52 ticks.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn ticks_to_secs(self, ticks: i64) -> f64 {
        ticks as f64 * self.as_secs_f64()
    }

    /// Converts seconds to the nearest tick count.
    ///
    /// Returns 0 for an invalid time base.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn secs_to_ticks(self, secs: f64) -> i64 {
        let tick = self.as_secs_f64();
        if tick <= 0.0 || !secs.is_finite() {
            return 0;
        }
        (secs / tick).round() as i64
    }

    /// Converts a non-negative tick count to a `Duration`.
    ///
    /// Negative tick counts saturate to zero.
    #[must_use]
    pub fn ticks_to_duration(self, ticks: i64) -> Duration {
        secs_to_duration(self.ticks_to_secs(ticks))
    }
}

impl Default for TimeBase {
    /// Microsecond ticks, matching FFmpeg's `AV_TIME_BASE`.
    fn default() -> Self {
        Self::new(1, 1_000_000)
    }
}

/// A frame rate as a rational number of frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    numerator: i32,
    denominator: i32,
}

impl FrameRate {
    #[must_use]
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    #[must_use]
    pub fn numerator(self) -> i32 {
        self.numerator
    }

    #[must_use]
    pub fn denominator(self) -> i32 {
        self.denominator
    }

    /// Frames per second, or `None` when the stream does not report a usable rate.
    #[must_use]
    pub fn fps(self) -> Option<f64> {
        if self.numerator <= 0 || self.denominator <= 0 {
            return None;
        }
        let fps = f64::from(self.numerator) / f64::from(self.denominator);
        fps.is_finite().then_some(fps)
    }

    /// Duration of one frame in seconds.
    #[must_use]
    pub fn period_secs(self) -> Option<f64> {
        self.fps().map(|fps| 1.0 / fps)
    }
}

/// Converts seconds to container-level microseconds (FFmpeg `AV_TIME_BASE`).
#[allow(clippy::cast_possible_truncation)]
#[inline]
#[must_use]
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * MICROS_PER_SECOND) as i64
}

/// Converts container-level microseconds to seconds.
#[allow(clippy::cast_precision_loss)]
#[inline]
#[must_use]
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SECOND
}

/// Converts signed seconds to a `Duration`, saturating negatives and NaN to zero.
#[must_use]
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;

    #[test]
    fn ticks_to_secs_uses_stream_time_base() {
        let tb = TimeBase::new(1, 30);
        assert_abs_diff_eq!(tb.ticks_to_secs(30), 1.0);
        assert_abs_diff_eq!(tb.ticks_to_secs(15), 0.5);

        let mpeg = TimeBase::new(1, 90_000);
        assert_abs_diff_eq!(mpeg.ticks_to_secs(90_000), 1.0);
        assert_abs_diff_eq!(mpeg.ticks_to_secs(3_003), 0.033_366_666, epsilon = 1e-9);
    }

    #[test]
    fn secs_to_ticks_rounds_to_nearest() {
        let tb = TimeBase::new(1, 30);
        assert_eq!(tb.secs_to_ticks(1.0), 30);
        assert_eq!(tb.secs_to_ticks(0.049), 1);
        assert_eq!(tb.secs_to_ticks(-1.0), -30);
    }

    #[test]
    fn invalid_time_base_yields_zero() {
        let tb = TimeBase::new(0, 0);
        assert!(!tb.is_valid());
        assert_eq!(tb.secs_to_ticks(5.0), 0);
        assert_abs_diff_eq!(tb.ticks_to_secs(100), 0.0);
    }

    #[test]
    fn negative_ticks_are_negative_seconds() {
        let tb = TimeBase::new(1, 1000);
        assert_abs_diff_eq!(tb.ticks_to_secs(-500), -0.5);
        assert_eq!(tb.ticks_to_duration(-500), Duration::ZERO);
    }

    #[test]
    fn frame_rate_rejects_zero_denominator() {
        assert_eq!(FrameRate::new(0, 0).fps(), None);
        assert_eq!(FrameRate::new(30, 0).fps(), None);
        assert_abs_diff_eq!(FrameRate::new(30_000, 1001).fps().unwrap(), 29.97, epsilon = 0.001);
        assert_abs_diff_eq!(FrameRate::new(25, 1).period_secs().unwrap(), 0.04);
    }

    #[test]
    fn micros_round_trip_within_microsecond() {
        let secs = 1.234_567;
        assert_abs_diff_eq!(micros_to_secs(secs_to_micros(secs)), secs, epsilon = 1e-6);
        assert_eq!(secs_to_micros(0.5), 500_000);
    }

    #[test]
    fn secs_to_duration_saturates() {
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(2.0), Duration::from_secs(2));
    }
}
