//! # Pulsedrive Driver Library
//!
//! Timing and sequencing engine for stepper-type servo drivers commanded
//! over three digital output lines (ENA, DIR, PUL) and two optional inputs
//! (PEND, ALM). Produces precisely timed pulse trains that move the motor
//! by an angular sector or at a speed for a duration, honoring the driver's
//! electrical timing contract: settle delays after enable/direction
//! changes, minimum pulse level durations, bounded electronic gear ratio.
//!
//! # Module Structure
//!
//! - [`timing`] - Hardware timing constants and rpm ↔ duration conversion
//! - [`freq_catalog`] - Achievable pulse frequencies per sampling granularity
//! - [`config`] - TOML configuration and derived timing constants
//! - [`gpio`] - Injected GPIO bus abstraction + simulation backend
//! - [`signal`] - Line roles and the settle-delayed level state machine
//! - [`commander`] - The [`Driver`] facade with the movement primitives
//! - [`diag`] - Severity-tagged diagnostic channel
//! - [`error`] - Error taxonomy
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use pulsedrive_driver::{Driver, DriverConfig, SimGpioBus, TracingSink};
//!
//! let config = DriverConfig::default();
//! let mut driver = Driver::new(config, SimGpioBus::new(), Arc::new(TracingSink))?;
//! driver.rotate_by_sector(90.0, Some(500.0))?;
//! driver.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Execution is single-threaded and blocking end-to-end; a started pulse
//! train always runs to completion. One bus handle per driver instance —
//! cross-thread sharing needs external mutual exclusion.

pub mod commander;
pub mod config;
pub mod diag;
pub mod error;
pub mod freq_catalog;
pub mod gpio;
pub mod signal;
pub mod timing;

pub use commander::{Driver, DriverSnapshot};
pub use config::{DerivedTiming, DriverConfig, LineBindings};
pub use diag::{DiagnosticEvent, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use error::{CommandError, ConfigError, GpioError};
pub use gpio::{GpioBus, Level, PinMode, SimGpioBus};
pub use signal::{LineRole, LineSnapshot, Rotation, SignalController};
pub use timing::{MAX_SPEED_RPM, NORMAL_SPEED_RPM, TimingConverter};
