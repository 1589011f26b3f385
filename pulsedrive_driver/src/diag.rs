//! Structured diagnostic channel.
//!
//! Control code never prints; it emits severity-tagged [`DiagnosticEvent`]s
//! into an injected [`DiagnosticSink`]. The default sink forwards to
//! `tracing`; [`MemorySink`] records events for inspection in tests.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::gpio::Level;
use crate::signal::{LineRole, LineSnapshot};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// Non-fatal events reported by the timing and sequencing engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Sector count does not divide the pulses-per-revolution exactly;
    /// pulses-per-sector was truncated toward zero.
    ImpreciseSectorDivision {
        sectors: u32,
        full_rotation_pulses: u32,
    },
    /// The level duration implied by the speed ceiling fell below the
    /// absolute hardware minimum and was clamped up to it.
    ClampedMinDuration { computed_us: f64, clamped_us: f64 },
    /// A conversion involved a speed above the absolute ceiling.
    SpeedAboveMax { speed_rpm: f64, max_rpm: f64 },
    /// A conversion involved a level duration below the hardware minimum.
    DurationBelowMin { duration_us: f64, min_us: f64 },
    /// An operation addressed a role with no bound physical line.
    UnboundLine { role: LineRole },
    /// A line level transition completed; `lines` is the post-transition
    /// snapshot of every bound role.
    LevelChanged {
        role: LineRole,
        level: Level,
        lines: LineSnapshot,
    },
    /// Writing the final safe levels during shutdown failed.
    ShutdownFailure { reason: String },
}

impl DiagnosticEvent {
    /// Severity tag for this event.
    pub fn severity(&self) -> Severity {
        match self {
            Self::LevelChanged { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

/// Observer of driver diagnostics.
///
/// Implementations must be callable from shared references; the driver
/// hands one sink to every component.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Default sink: forwards events to `tracing` at their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: DiagnosticEvent) {
        match event.severity() {
            Severity::Info => info!(?event, "driver diagnostic"),
            Severity::Warning => warn!(?event, "driver diagnostic"),
        }
    }
}

/// Recording sink for tests and external observers.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        // A panicking observer must not take the channel down with it.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    /// Drain and return all recorded events.
    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of recorded events with the given severity.
    pub fn count_with_severity(&self, severity: Severity) -> usize {
        self.events()
            .iter()
            .filter(|e| e.severity() == severity)
            .count()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: DiagnosticEvent) {
        self.lock().push(event);
    }
}
