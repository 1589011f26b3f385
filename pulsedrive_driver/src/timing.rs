//! Hardware timing constants and rpm ↔ level-duration conversion.
//!
//! A pulse period commands one motor micro-step. With `full_rotation_pulses`
//! micro-steps per revolution and a speed of `rpm` revolutions per 60 s, one
//! period lasts `60 / (rpm × full_rotation_pulses)` seconds and each level
//! (HIGH or LOW half) lasts half of that — hence the factor 30.

use std::time::{Duration, Instant};

use crate::diag::{DiagnosticEvent, DiagnosticSink};

/// Full steps per motor revolution before microstepping.
pub const BASE_STEPS_PER_REV: u32 = 200;

/// Nominal operating speed [rpm].
pub const NORMAL_SPEED_RPM: f64 = 1000.0;

/// Absolute speed ceiling [rpm]. Commands above this are rejected.
pub const MAX_SPEED_RPM: f64 = 2000.0;

/// Shortest level (HIGH or LOW half-period) the driver accepts.
pub const ABSOLUTE_MIN_LEVEL_DURATION: Duration = Duration::from_nanos(2_500);

/// Shortest full pulse period the driver accepts.
pub const MIN_PULSE_PERIOD: Duration = Duration::from_micros(5);

/// Settle window after an ENABLE level change, before DIR may change.
pub const ENABLE_SETTLE: Duration = Duration::from_micros(5);

/// Settle window after a DIRECTION level change, before PUL may change.
pub const DIRECTION_SETTLE: Duration = Duration::from_micros(100);

/// Electronic gear ratio lower bound.
pub const EGR_MIN: f64 = 0.05;

/// Electronic gear ratio upper bound.
pub const EGR_MAX: f64 = 20.0;

/// Block for at least `duration` by spinning on the monotonic clock.
///
/// The settle windows are 5–100 µs; the stock-kernel sleeper granularity is
/// coarser than that, so level timing uses a deadline spin instead.
pub fn busy_wait(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Converter between rotational speed and per-level pulse duration.
///
/// Both conversions only report limit violations through the diagnostic
/// sink; clamping is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConverter {
    full_rotation_pulses: u32,
}

impl TimingConverter {
    /// Create a converter for a motor with `full_rotation_pulses` pulses
    /// per revolution.
    pub const fn new(full_rotation_pulses: u32) -> Self {
        Self {
            full_rotation_pulses,
        }
    }

    /// Pulses per full revolution this converter was built for.
    #[inline]
    pub const fn full_rotation_pulses(&self) -> u32 {
        self.full_rotation_pulses
    }

    /// Level duration [s] producing `speed_rpm`.
    ///
    /// `speed_rpm` must be positive; reports `SpeedAboveMax` /
    /// `DurationBelowMin` when the ceilings are violated.
    pub fn speed_to_level_duration(&self, speed_rpm: f64, sink: &dyn DiagnosticSink) -> f64 {
        if speed_rpm > MAX_SPEED_RPM {
            sink.emit(DiagnosticEvent::SpeedAboveMax {
                speed_rpm,
                max_rpm: MAX_SPEED_RPM,
            });
        }
        let duration = 30.0 / (speed_rpm * self.full_rotation_pulses as f64);
        if duration < ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() {
            sink.emit(DiagnosticEvent::DurationBelowMin {
                duration_us: duration * 1e6,
                min_us: ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() * 1e6,
            });
        }
        duration
    }

    /// Speed [rpm] produced by holding each level for `duration_secs`.
    ///
    /// Inverse of [`Self::speed_to_level_duration`]; same reporting policy.
    pub fn level_duration_to_speed(&self, duration_secs: f64, sink: &dyn DiagnosticSink) -> f64 {
        if duration_secs < ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() {
            sink.emit(DiagnosticEvent::DurationBelowMin {
                duration_us: duration_secs * 1e6,
                min_us: ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() * 1e6,
            });
        }
        let speed = 30.0 / (duration_secs * self.full_rotation_pulses as f64);
        if speed > MAX_SPEED_RPM {
            sink.emit(DiagnosticEvent::SpeedAboveMax {
                speed_rpm: speed,
                max_rpm: MAX_SPEED_RPM,
            });
        }
        speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::MemorySink;

    #[test]
    fn conversion_matches_formula() {
        let sink = MemorySink::default();
        // microstep 10 -> 2000 pulses/rev
        let conv = TimingConverter::new(2000);
        assert_eq!(conv.full_rotation_pulses(), 2000);
        let duration = conv.speed_to_level_duration(2000.0, &sink);
        assert!((duration - 7.5e-6).abs() < 1e-12);
        // 1000 rpm at microstep 1
        let conv = TimingConverter::new(200);
        let duration = conv.speed_to_level_duration(1000.0, &sink);
        assert!((duration - 1.5e-4).abs() < 1e-12);
    }

    #[test]
    fn round_trip_law() {
        let sink = MemorySink::default();
        let conv = TimingConverter::new(2000);
        for speed in [1.0, 5.0, 60.0, 333.3, 1000.0, 2000.0] {
            let back = conv.level_duration_to_speed(conv.speed_to_level_duration(speed, &sink), &sink);
            assert!((back - speed).abs() / speed < 1e-9, "speed {speed} -> {back}");
        }
    }

    #[test]
    fn reports_speed_above_max() {
        let sink = MemorySink::default();
        let conv = TimingConverter::new(2000);
        conv.speed_to_level_duration(2500.0, &sink);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::SpeedAboveMax { speed_rpm, .. } if *speed_rpm == 2500.0
        )));
    }

    #[test]
    fn reports_duration_below_min() {
        let sink = MemorySink::default();
        // microstep 32 -> 6400 pulses/rev; 2000 rpm -> ~2.34 us < 2.5 us
        let conv = TimingConverter::new(6400);
        let duration = conv.speed_to_level_duration(2000.0, &sink);
        assert!(duration < ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, DiagnosticEvent::DurationBelowMin { .. })));
    }

    #[test]
    fn busy_wait_blocks_at_least_requested() {
        let start = Instant::now();
        busy_wait(Duration::from_micros(100));
        assert!(start.elapsed() >= Duration::from_micros(100));
    }
}
