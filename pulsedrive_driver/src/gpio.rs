//! GPIO bus abstraction and simulation backend.
//!
//! The driver never touches a process-global hardware handle; a [`GpioBus`]
//! implementation is injected at construction. [`SimGpioBus`] is the backend
//! shipped in-tree: it keeps line state in memory and records every bus
//! operation with a monotonic timestamp, which is what the tests (and the
//! shell's simulate mode) observe instead of real pins.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::GpioError;

/// Logical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// The other level.
    #[inline]
    pub const fn complement(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    /// Numeric form, LOW = 0 and HIGH = 1.
    #[inline]
    pub const fn as_bit(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Line direction at the bus level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    Input,
    Output,
}

/// Injected GPIO access abstraction.
///
/// One bus handle per logical driver instance; concurrent access from
/// multiple threads requires external mutual exclusion.
pub trait GpioBus {
    /// Whether the underlying resource is reachable. Checked once at
    /// startup; no line operation is safe when this is false.
    fn is_connected(&self) -> bool;

    /// Configure a line as input or output.
    fn set_mode(&mut self, line: u8, mode: PinMode) -> Result<(), GpioError>;

    /// Drive an output line to `level`.
    fn write(&mut self, line: u8, level: Level) -> Result<(), GpioError>;

    /// Read the current level of a line.
    fn read(&self, line: u8) -> Result<Level, GpioError>;

    /// Release the underlying resource. Must be idempotent.
    fn release(&mut self);
}

/// One recorded bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    SetMode { line: u8, mode: PinMode },
    Write { line: u8, level: Level },
    Release,
}

/// Timestamped entry in the simulation op log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimEvent {
    /// When the operation was applied.
    pub at: Instant,
    /// What was applied.
    pub op: SimOp,
}

/// In-memory GPIO backend.
#[derive(Debug)]
pub struct SimGpioBus {
    connected: bool,
    released: bool,
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, Level>,
    log: Vec<SimEvent>,
    failing_lines: HashSet<u8>,
}

impl Default for SimGpioBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpioBus {
    /// A connected bus with all lines LOW.
    pub fn new() -> Self {
        Self {
            connected: true,
            released: false,
            modes: HashMap::new(),
            levels: HashMap::new(),
            log: Vec::new(),
            failing_lines: HashSet::new(),
        }
    }

    /// A bus that reports no connection, for startup-failure paths.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    /// Make every subsequent write to `line` fail.
    pub fn fail_writes_on(&mut self, line: u8) {
        self.failing_lines.insert(line);
    }

    /// Force the level seen by reads of `line` (simulated external signal).
    pub fn set_input_level(&mut self, line: u8, level: Level) {
        self.levels.insert(line, level);
    }

    /// Current level of `line`, LOW when never driven.
    pub fn level(&self, line: u8) -> Level {
        self.levels.get(&line).copied().unwrap_or(Level::Low)
    }

    /// Configured mode of `line`, if any.
    pub fn mode(&self, line: u8) -> Option<PinMode> {
        self.modes.get(&line).copied()
    }

    /// Whether `release()` has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Full timestamped operation log.
    pub fn op_log(&self) -> &[SimEvent] {
        &self.log
    }

    /// Number of `Write` operations recorded so far.
    pub fn write_count(&self) -> usize {
        self.log
            .iter()
            .filter(|e| matches!(e.op, SimOp::Write { .. }))
            .count()
    }

    /// Write operations for one line, in emission order.
    pub fn writes_to(&self, line: u8) -> Vec<SimEvent> {
        self.log
            .iter()
            .filter(|e| matches!(e.op, SimOp::Write { line: l, .. } if l == line))
            .copied()
            .collect()
    }

    fn record(&mut self, op: SimOp) {
        self.log.push(SimEvent {
            at: Instant::now(),
            op,
        });
    }
}

impl GpioBus for SimGpioBus {
    fn is_connected(&self) -> bool {
        self.connected && !self.released
    }

    fn set_mode(&mut self, line: u8, mode: PinMode) -> Result<(), GpioError> {
        if self.released {
            return Err(GpioError::Released);
        }
        debug!(line, ?mode, "sim set_mode");
        self.modes.insert(line, mode);
        self.record(SimOp::SetMode { line, mode });
        Ok(())
    }

    fn write(&mut self, line: u8, level: Level) -> Result<(), GpioError> {
        if self.released {
            return Err(GpioError::Released);
        }
        if self.failing_lines.contains(&line) {
            return Err(GpioError::WriteFailed {
                line,
                reason: "scripted failure".into(),
            });
        }
        trace!(line, bit = level.as_bit(), "sim write");
        self.levels.insert(line, level);
        self.record(SimOp::Write { line, level });
        Ok(())
    }

    fn read(&self, line: u8) -> Result<Level, GpioError> {
        if self.released {
            return Err(GpioError::Released);
        }
        Ok(self.level(line))
    }

    fn release(&mut self) {
        if !self.released {
            debug!("sim bus released");
            self.released = true;
            self.record(SimOp::Release);
        }
    }
}
