//! Error taxonomy for the pulse driver.
//!
//! Three layers, matching how failures propagate:
//! - [`GpioError`] — raw bus access failures reported by a backend.
//! - [`ConfigError`] — fatal at construction; the driver never comes up.
//! - [`CommandError`] — recoverable, local to one call; driver state is
//!   unchanged aside from levels already written before the failing step.

use thiserror::Error;

use crate::signal::LineRole;

/// GPIO backend access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpioError {
    /// A level write to a line was rejected by the backend.
    #[error("write to GPIO line {line} failed: {reason}")]
    WriteFailed { line: u8, reason: String },

    /// A level read from a line failed.
    #[error("read of GPIO line {line} failed: {reason}")]
    ReadFailed { line: u8, reason: String },

    /// The bus handle was already released.
    #[error("GPIO bus already released")]
    Released,
}

/// Fatal construction-time errors. The caller should abort driver setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Sampling granularity is not a frequency-catalog key.
    #[error("unsupported sample rate {0} us, supported: [1, 2, 4, 5, 8, 10]")]
    UnsupportedSampleRate(u32),

    /// The GPIO bus reports no connection; no line operation is safe.
    #[error("GPIO bus not connected")]
    NotConnected,

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// Configuration file not found at the given path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Bus access failed while driving the initial safe levels.
    #[error("GPIO error during initialization: {0}")]
    Gpio(#[from] GpioError),
}

/// Recoverable per-call errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Commanded speed exceeds the absolute or microstep-derived ceiling.
    /// The call aborts with no hardware side effect.
    #[error("speed {speed_rpm} rpm out of range (limit {limit_rpm} rpm)")]
    SpeedOutOfRange { speed_rpm: f64, limit_rpm: f64 },

    /// The role has no bound physical line; the operation was a no-op.
    #[error("no GPIO line bound for role {0}")]
    UnboundLine(LineRole),

    /// Level writes are not legal on input roles.
    #[error("role {0} is input-only, level writes rejected")]
    InvalidLevel(LineRole),

    /// Bus access failed mid-operation.
    #[error(transparent)]
    Gpio(#[from] GpioError),

    /// Writing the final safe levels during `stop()` failed. The bus was
    /// still released.
    #[error("shutdown failure: {0}")]
    ShutdownFailure(String),
}
