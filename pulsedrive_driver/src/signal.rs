//! Signal roles and the line-level state machine.
//!
//! `SignalController` owns the authoritative logical level of every bound
//! line and performs transitions with the mandatory settle delays from the
//! driver's electrical acceptance window: 5 µs after an ENABLE change,
//! 100 µs after a DIRECTION change, nothing otherwise. Output levels are
//! never re-read from hardware; the in-memory state is the source of truth
//! (toggle = complement of the recorded level). Only the input roles
//! (PEND, ALM) go to the bus on read.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LineBindings;
use crate::diag::{DiagnosticEvent, DiagnosticSink};
use crate::error::{CommandError, ConfigError};
use crate::gpio::{GpioBus, Level, PinMode};
use crate::timing::{DIRECTION_SETTLE, ENABLE_SETTLE, busy_wait};

// ─── LineRole ───────────────────────────────────────────────────────

/// Functional role of a driver signal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    /// PUL — each full pulse commands one motor micro-step.
    Pulse,
    /// ENA — LOW activates the driver output stage.
    Enable,
    /// DIR — rotation sense, HIGH = clockwise.
    Direction,
    /// PEND input — driver reports in-position.
    PositionReached,
    /// ALM input — driver alarm.
    Alarm,
}

impl LineRole {
    /// Every role, in settle-order (ENA before DIR before PUL, inputs last).
    pub const ALL: [Self; 5] = [
        Self::Enable,
        Self::Direction,
        Self::Pulse,
        Self::PositionReached,
        Self::Alarm,
    ];

    /// Whether this role is an input from the driver.
    #[inline]
    pub const fn is_input(self) -> bool {
        matches!(self, Self::PositionReached | Self::Alarm)
    }

    /// Mandatory settle delay after a level change on this role.
    #[inline]
    pub const fn settle(self) -> Duration {
        match self {
            Self::Enable => ENABLE_SETTLE,
            Self::Direction => DIRECTION_SETTLE,
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulse => write!(f, "PUL"),
            Self::Enable => write!(f, "ENA"),
            Self::Direction => write!(f, "DIR"),
            Self::PositionReached => write!(f, "PEND"),
            Self::Alarm => write!(f, "ALM"),
        }
    }
}

impl FromStr for LineRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUL" | "PULSE" => Ok(Self::Pulse),
            "ENA" | "ENABLE" => Ok(Self::Enable),
            "DIR" | "DIRECTION" => Ok(Self::Direction),
            "PEND" => Ok(Self::PositionReached),
            "ALM" | "ALARM" => Ok(Self::Alarm),
            _ => Err(format!("unknown line role: {s:?}")),
        }
    }
}

// ─── Rotation sense ─────────────────────────────────────────────────

/// Rotation sense encoded on the DIRECTION line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// DIR HIGH.
    Clockwise,
    /// DIR LOW.
    CounterClockwise,
}

impl Rotation {
    /// DIRECTION line level encoding this sense.
    #[inline]
    pub const fn level(self) -> Level {
        match self {
            Self::Clockwise => Level::High,
            Self::CounterClockwise => Level::Low,
        }
    }

    /// Sense commanded by the sign of a sector or speed value.
    /// Non-negative means clockwise.
    #[inline]
    pub fn from_sign(value: f64) -> Self {
        if value < 0.0 {
            Self::CounterClockwise
        } else {
            Self::Clockwise
        }
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────

/// Observable level of every bound role. Unbound (or unreadable input)
/// roles are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineSnapshot {
    pub pulse: Option<Level>,
    pub enable: Option<Level>,
    pub direction: Option<Level>,
    pub position_reached: Option<Level>,
    pub alarm: Option<Level>,
}

// ─── SignalController ───────────────────────────────────────────────

/// State machine over the driver's signal lines.
pub struct SignalController<G: GpioBus> {
    gpio: G,
    bindings: LineBindings,
    pulse: Option<Level>,
    enable: Option<Level>,
    direction: Option<Level>,
    sink: Arc<dyn DiagnosticSink>,
    released: bool,
}

impl<G: GpioBus> SignalController<G> {
    /// Bring up the signal lines.
    ///
    /// Checks bus connectivity (fatal when absent), configures pin modes,
    /// then drives the initial levels: ENABLE LOW (driver active) and
    /// DIRECTION HIGH (clockwise) where bound, each followed by its settle
    /// delay. PULSE starts LOW without a write.
    pub fn new(
        mut gpio: G,
        bindings: LineBindings,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        if !gpio.is_connected() {
            return Err(ConfigError::NotConnected);
        }

        for role in LineRole::ALL {
            if let Some(line) = bindings.line(role) {
                let mode = if role.is_input() {
                    PinMode::Input
                } else {
                    PinMode::Output
                };
                gpio.set_mode(line, mode)?;
                debug!(%role, line, ?mode, "line configured");
            }
        }

        let mut controller = Self {
            pulse: bindings.line(LineRole::Pulse).map(|_| Level::Low),
            enable: bindings.line(LineRole::Enable).map(|_| Level::Low),
            direction: bindings.line(LineRole::Direction).map(|_| Level::Low),
            gpio,
            bindings,
            sink,
            released: false,
        };

        if controller.bindings.line(LineRole::Enable).is_some() {
            controller
                .set_level(LineRole::Enable, Some(Level::Low))
                .map_err(|e| Self::init_error(e))?;
        }
        if controller.bindings.line(LineRole::Direction).is_some() {
            controller
                .set_level(LineRole::Direction, Some(Level::High))
                .map_err(|e| Self::init_error(e))?;
        }

        Ok(controller)
    }

    fn init_error(e: CommandError) -> ConfigError {
        match e {
            CommandError::Gpio(g) => ConfigError::Gpio(g),
            other => ConfigError::ValidationError(other.to_string()),
        }
    }

    /// Shared GPIO bus reference (simulation backends expose their op log
    /// through this).
    pub fn bus(&self) -> &G {
        &self.gpio
    }

    /// Mutable GPIO bus reference.
    pub fn bus_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// Authoritative level of an output role, `None` when unbound.
    pub fn level_of(&self, role: LineRole) -> Option<Level> {
        match role {
            LineRole::Pulse => self.pulse,
            LineRole::Enable => self.enable,
            LineRole::Direction => self.direction,
            _ => None,
        }
    }

    fn store(&mut self, role: LineRole, level: Level) {
        match role {
            LineRole::Pulse => self.pulse = Some(level),
            LineRole::Enable => self.enable = Some(level),
            LineRole::Direction => self.direction = Some(level),
            _ => {}
        }
    }

    /// Drive `role` to `level`, or to the complement of its current state
    /// when `level` is `None` (toggle).
    ///
    /// Blocks for the role's settle delay after the write. Returns the
    /// level actually driven.
    pub fn set_level(
        &mut self,
        role: LineRole,
        level: Option<Level>,
    ) -> Result<Level, CommandError> {
        if role.is_input() {
            warn!(%role, "level write rejected on input role");
            return Err(CommandError::InvalidLevel(role));
        }
        let Some(line) = self.bindings.line(role) else {
            self.sink.emit(DiagnosticEvent::UnboundLine { role });
            return Err(CommandError::UnboundLine(role));
        };

        let current = self.level_of(role).unwrap_or(Level::Low);
        let target = level.unwrap_or_else(|| current.complement());

        self.gpio.write(line, target)?;
        self.store(role, target);
        busy_wait(role.settle());

        debug!(%role, %target, "level changed");
        self.sink.emit(DiagnosticEvent::LevelChanged {
            role,
            level: target,
            lines: self.snapshot(),
        });
        Ok(target)
    }

    /// Current level of `role`: authoritative state for outputs, hardware
    /// read for inputs.
    pub fn read_level(&self, role: LineRole) -> Result<Level, CommandError> {
        let Some(line) = self.bindings.line(role) else {
            self.sink.emit(DiagnosticEvent::UnboundLine { role });
            return Err(CommandError::UnboundLine(role));
        };
        if role.is_input() {
            Ok(self.gpio.read(line)?)
        } else {
            Ok(self.level_of(role).unwrap_or(Level::Low))
        }
    }

    /// Observable state of every bound role.
    pub fn snapshot(&self) -> LineSnapshot {
        let read_input = |role: LineRole| {
            self.bindings
                .line(role)
                .and_then(|line| self.gpio.read(line).ok())
        };
        LineSnapshot {
            pulse: self.pulse,
            enable: self.enable,
            direction: self.direction,
            position_reached: read_input(LineRole::PositionReached),
            alarm: read_input(LineRole::Alarm),
        }
    }

    /// Emit `pulses` symmetric 50%-duty pulses on the PULSE line, holding
    /// each level for `level_duration`.
    ///
    /// No settle delay applies between pulses; only the level duration
    /// governs timing. On a mid-train write failure the recorded state
    /// reflects the last successful write.
    pub fn pulse_train(
        &mut self,
        pulses: u64,
        level_duration: Duration,
    ) -> Result<(), CommandError> {
        let Some(line) = self.bindings.line(LineRole::Pulse) else {
            self.sink.emit(DiagnosticEvent::UnboundLine {
                role: LineRole::Pulse,
            });
            return Err(CommandError::UnboundLine(LineRole::Pulse));
        };

        debug!(pulses, level_duration_us = level_duration.as_secs_f64() * 1e6, "pulse train");
        for _ in 0..pulses {
            self.gpio.write(line, Level::High)?;
            self.pulse = Some(Level::High);
            busy_wait(level_duration);
            self.gpio.write(line, Level::Low)?;
            self.pulse = Some(Level::Low);
            busy_wait(level_duration);
        }
        Ok(())
    }

    /// Release the GPIO handle. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.gpio.release();
            self.released = true;
        }
    }
}

impl<G: GpioBus> Drop for SignalController<G> {
    fn drop(&mut self) {
        self.release();
    }
}
