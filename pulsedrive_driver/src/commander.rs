//! The driver facade: movement primitives over the signal state machine.
//!
//! `Driver` composes the validated configuration, the derived timing
//! constants and the [`SignalController`], and executes the two movement
//! primitives. Every operation is a synchronous sequence of line writes
//! interleaved with blocking delays; once a pulse train starts it runs to
//! completion of its computed pulse count.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{DerivedTiming, DriverConfig};
use crate::diag::{DiagnosticEvent, DiagnosticSink};
use crate::error::{CommandError, ConfigError};
use crate::gpio::{GpioBus, Level};
use crate::signal::{LineRole, LineSnapshot, Rotation, SignalController};
use crate::timing::{MAX_SPEED_RPM, TimingConverter};

/// Diagnostic snapshot: current line levels plus the derived timing
/// constants, serializable for external observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverSnapshot {
    pub lines: LineSnapshot,
    pub timing: DerivedTiming,
}

/// Pulse-train driver for an ENA/DIR/PUL stepper-type servo driver.
pub struct Driver<G: GpioBus> {
    signals: SignalController<G>,
    timing: DerivedTiming,
    converter: TimingConverter,
    sink: Arc<dyn DiagnosticSink>,
}

impl<G: GpioBus> Driver<G> {
    /// Validate `config`, derive the timing constants and bring up the
    /// signal lines on `gpio`.
    ///
    /// Fatal errors (unsupported sample rate, disconnected bus, invalid
    /// config) abort construction; `ImpreciseSectorDivision` and
    /// `ClampedMinDuration` are reported through `sink` and construction
    /// proceeds.
    pub fn new(
        config: DriverConfig,
        gpio: G,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let timing = DerivedTiming::derive(&config, sink.as_ref())?;
        let converter = TimingConverter::new(timing.full_rotation_pulses);
        let signals = SignalController::new(gpio, config.lines.clone(), Arc::clone(&sink))?;
        info!(
            microstep = config.microstep,
            sectors = config.sectors,
            bound = ?config.lines.bound_roles(),
            "driver initialized"
        );
        Ok(Self {
            signals,
            timing,
            converter,
            sink,
        })
    }

    /// Derived timing constants.
    #[inline]
    pub const fn timing(&self) -> &DerivedTiming {
        &self.timing
    }

    /// GPIO bus reference.
    pub fn bus(&self) -> &G {
        self.signals.bus()
    }

    /// Mutable GPIO bus reference.
    pub fn bus_mut(&mut self) -> &mut G {
        self.signals.bus_mut()
    }

    /// Drive a line level (or toggle when `level` is `None`). Delegates to
    /// the signal state machine, settle delays included.
    pub fn set_level(
        &mut self,
        role: LineRole,
        level: Option<Level>,
    ) -> Result<Level, CommandError> {
        self.signals.set_level(role, level)
    }

    /// Current level of a line.
    pub fn read_level(&self, role: LineRole) -> Result<Level, CommandError> {
        self.signals.read_level(role)
    }

    /// Diagnostic snapshot of line levels and timing constants.
    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            lines: self.signals.snapshot(),
            timing: self.timing,
        }
    }

    /// Change DIRECTION only when it differs from the authoritative state,
    /// paying the DIR settle delay exactly once.
    fn apply_rotation(&mut self, rotation: Rotation) -> Result<(), CommandError> {
        if self.signals.level_of(LineRole::Direction) != Some(rotation.level()) {
            self.signals
                .set_level(LineRole::Direction, Some(rotation.level()))?;
        }
        Ok(())
    }

    /// Level duration for an optional speed command: convert and clamp up
    /// to the derived minimum, or use the minimum directly when no speed
    /// (or a non-positive one) is given.
    fn resolve_level_duration(&self, speed_rpm: Option<f64>) -> Duration {
        let min = self.timing.min_level_duration;
        match speed_rpm {
            Some(speed) if speed.abs() > 0.0 => {
                let secs = self
                    .converter
                    .speed_to_level_duration(speed.abs(), self.sink.as_ref());
                let duration = Duration::from_secs_f64(secs);
                if duration < min { min } else { duration }
            }
            Some(_) => {
                warn!("zero speed requested, falling back to minimum level duration");
                min
            }
            None => min,
        }
    }

    /// Rotate by `sector` angular sectors; the sign selects the rotation
    /// sense (negative = counter-clockwise), zero leaves DIRECTION alone.
    ///
    /// With `speed_rpm` given the pulse rate follows it (clamped to the
    /// derived minimum level duration); otherwise the motor runs at the
    /// maximum configured rate. Emits `trunc(|sector| × pulses_per_sector)`
    /// full pulses and blocks until the train completes.
    pub fn rotate_by_sector(
        &mut self,
        sector: f64,
        speed_rpm: Option<f64>,
    ) -> Result<(), CommandError> {
        if sector != 0.0 {
            self.apply_rotation(Rotation::from_sign(sector))?;
        }
        let level_duration = self.resolve_level_duration(speed_rpm);
        let pulses = (sector.abs() * self.timing.pulses_per_sector as f64) as u64;
        info!(
            sector,
            pulses,
            level_duration_us = level_duration.as_secs_f64() * 1e6,
            "rotate by sector"
        );
        self.signals.pulse_train(pulses, level_duration)
    }

    /// Rotate at `speed_rpm` (sign = sense) for `duration_secs`.
    ///
    /// Rejects the command before any line write when the speed magnitude
    /// exceeds the absolute ceiling or the microstep-derived hardware
    /// maximum, or is zero. `Ok(())` is the success indicator; there is no
    /// partial-completion path.
    pub fn rotate_by_speed(
        &mut self,
        speed_rpm: f64,
        duration_secs: f64,
    ) -> Result<(), CommandError> {
        let magnitude = speed_rpm.abs();
        if magnitude > MAX_SPEED_RPM {
            return Err(CommandError::SpeedOutOfRange {
                speed_rpm,
                limit_rpm: MAX_SPEED_RPM,
            });
        }
        if magnitude > self.timing.hardware_max_speed_rpm || magnitude == 0.0 {
            return Err(CommandError::SpeedOutOfRange {
                speed_rpm,
                limit_rpm: self.timing.hardware_max_speed_rpm,
            });
        }

        self.apply_rotation(Rotation::from_sign(speed_rpm))?;

        let pulses_per_second = (magnitude / 60.0 * self.timing.full_rotation_pulses as f64) as u64;
        let level_duration = self.resolve_level_duration(Some(magnitude));
        let pulses = (pulses_per_second as f64 * duration_secs) as u64;

        // Known PUL starting level before the train begins.
        self.signals.set_level(LineRole::Pulse, Some(Level::Low))?;

        info!(
            speed_rpm,
            duration_secs,
            pulses,
            level_duration_us = level_duration.as_secs_f64() * 1e6,
            "rotate by speed"
        );
        self.signals.pulse_train(pulses, level_duration)
    }

    /// Shut the driver down: PULSE LOW, ENABLE HIGH (output stage off),
    /// then release the GPIO handle.
    ///
    /// The release step runs on every path, including when the safe-level
    /// writes fail; such failures come back as `ShutdownFailure` after the
    /// handle is gone. Unbound lines are skipped.
    pub fn stop(&mut self) -> Result<(), CommandError> {
        let mut first_failure: Option<CommandError> = None;
        for (role, level) in [(LineRole::Pulse, Level::Low), (LineRole::Enable, Level::High)] {
            match self.signals.set_level(role, Some(level)) {
                Ok(_) | Err(CommandError::UnboundLine(_)) => {}
                Err(e) => {
                    warn!(%role, error = %e, "safe-level write failed during stop");
                    first_failure.get_or_insert(e);
                }
            }
        }
        self.signals.release();
        info!("driver stopped, GPIO released");

        match first_failure {
            None => Ok(()),
            Some(e) => {
                let reason = e.to_string();
                self.sink.emit(DiagnosticEvent::ShutdownFailure {
                    reason: reason.clone(),
                });
                Err(CommandError::ShutdownFailure(reason))
            }
        }
    }
}
