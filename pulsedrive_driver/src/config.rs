//! Driver configuration and derived timing constants.
//!
//! `DriverConfig` is supplied once (TOML file or defaults), validated, and
//! then reduced to an immutable [`DerivedTiming`] that every movement
//! primitive reads from.
//!
//! # TOML Example
//!
//! ```toml
//! microstep = 10
//! reduction_ratio = 100
//! sample_rate_us = 5
//! sectors = 400
//!
//! [lines]
//! pulse = 18
//! enable = 13
//! direction = 23
//! position_reached = 12
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diag::{DiagnosticEvent, DiagnosticSink};
use crate::error::ConfigError;
use crate::freq_catalog;
use crate::signal::LineRole;
use crate::timing::{
    ABSOLUTE_MIN_LEVEL_DURATION, BASE_STEPS_PER_REV, EGR_MAX, EGR_MIN, MAX_SPEED_RPM,
    NORMAL_SPEED_RPM, TimingConverter,
};

// ─── Line bindings ──────────────────────────────────────────────────

/// Optional GPIO line number per signal role.
///
/// PULSE, ENABLE and DIRECTION are outputs; POSITION_REACHED and ALARM are
/// inputs and commonly left unwired. An unbound role surfaces per-call as
/// `UnboundLine`, never at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineBindings {
    /// PUL+ line; rising/falling edges command micro-steps.
    #[serde(default = "default_pulse_line")]
    pub pulse: Option<u8>,
    /// ENA+ line; LOW activates the driver output stage.
    #[serde(default = "default_enable_line")]
    pub enable: Option<u8>,
    /// DIR+ line; HIGH = clockwise by convention.
    #[serde(default = "default_direction_line")]
    pub direction: Option<u8>,
    /// PEND input; asserted when the driver reports in-position.
    #[serde(default)]
    pub position_reached: Option<u8>,
    /// ALM input; asserted on a driver alarm.
    #[serde(default)]
    pub alarm: Option<u8>,
}

fn default_pulse_line() -> Option<u8> {
    Some(18)
}

fn default_enable_line() -> Option<u8> {
    Some(13)
}

fn default_direction_line() -> Option<u8> {
    Some(23)
}

impl Default for LineBindings {
    fn default() -> Self {
        Self {
            pulse: default_pulse_line(),
            enable: default_enable_line(),
            direction: default_direction_line(),
            position_reached: None,
            alarm: None,
        }
    }
}

impl LineBindings {
    /// Line bound to `role`, if any.
    pub fn line(&self, role: LineRole) -> Option<u8> {
        match role {
            LineRole::Pulse => self.pulse,
            LineRole::Enable => self.enable,
            LineRole::Direction => self.direction,
            LineRole::PositionReached => self.position_reached,
            LineRole::Alarm => self.alarm,
        }
    }

    /// Roles with a bound line, in settle-order (ENA, DIR, PUL, inputs).
    pub fn bound_roles(&self) -> Vec<LineRole> {
        LineRole::ALL
            .into_iter()
            .filter(|role| self.line(*role).is_some())
            .collect()
    }
}

// ─── Driver configuration ───────────────────────────────────────────

/// Immutable driver configuration, supplied once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// GPIO line bindings.
    #[serde(default)]
    pub lines: LineBindings,

    /// Pulses per full motor step (driver P001 parameter), ≥ 1.
    #[serde(default = "default_microstep")]
    pub microstep: u32,

    /// External gearbox ratio (informational).
    #[serde(default = "default_reduction_ratio")]
    pub reduction_ratio: u32,

    /// Electronic gear ratio, if configured on the driver. Must sit in
    /// [0.05, 20] when present.
    #[serde(default)]
    pub electronic_gear_ratio: Option<f64>,

    /// GPIO daemon sampling granularity [µs]; must be a frequency-catalog key.
    #[serde(default = "default_sample_rate_us")]
    pub sample_rate_us: u32,

    /// Angular subdivisions per full rotation (360 for degrees).
    #[serde(default = "default_sectors")]
    pub sectors: u32,
}

fn default_microstep() -> u32 {
    10
}

fn default_reduction_ratio() -> u32 {
    100
}

fn default_sample_rate_us() -> u32 {
    5
}

fn default_sectors() -> u32 {
    400
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            lines: LineBindings::default(),
            microstep: default_microstep(),
            reduction_ratio: default_reduction_ratio(),
            electronic_gear_ratio: None,
            sample_rate_us: default_sample_rate_us(),
            sectors: default_sectors(),
        }
    }
}

impl DriverConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading driver configuration from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation.
    ///
    /// Rejects: zero microstep or sector count, a microstep whose pulse
    /// count exceeds the representable range, a sampling granularity
    /// outside the frequency catalog, an electronic gear ratio outside
    /// [0.05, 20].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.microstep == 0 {
            return Err(ConfigError::ValidationError(
                "microstep must be >= 1".into(),
            ));
        }
        if self.microstep.checked_mul(BASE_STEPS_PER_REV).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "microstep {} overflows the pulses-per-revolution range",
                self.microstep
            )));
        }
        if self.sectors == 0 {
            return Err(ConfigError::ValidationError("sectors must be >= 1".into()));
        }
        freq_catalog::lookup(self.sample_rate_us)?;
        if let Some(egr) = self.electronic_gear_ratio
            && !(EGR_MIN..=EGR_MAX).contains(&egr)
        {
            return Err(ConfigError::ValidationError(format!(
                "electronic gear ratio {egr} outside [{EGR_MIN}, {EGR_MAX}]"
            )));
        }
        Ok(())
    }
}

// ─── Derived timing ─────────────────────────────────────────────────

/// Geometric and timing constants computed once from [`DriverConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedTiming {
    /// Pulses per full motor revolution (`microstep × 200`).
    pub full_rotation_pulses: u32,
    /// Seconds for one revolution at [`NORMAL_SPEED_RPM`].
    pub seconds_per_revolution: f64,
    /// Pulses per configured angular sector (truncated toward zero).
    pub pulses_per_sector: u32,
    /// Fastest speed this microstep setting can reach [rpm], capped at
    /// [`MAX_SPEED_RPM`].
    pub hardware_max_speed_rpm: f64,
    /// Shortest level duration the engine will ever emit.
    pub min_level_duration: Duration,
}

impl DerivedTiming {
    /// Derive the timing constants for `config`.
    ///
    /// Pure aside from diagnostics: `ImpreciseSectorDivision` when the
    /// sector count does not divide the pulse count exactly and
    /// `ClampedMinDuration` when the speed-ceiling duration undercuts the
    /// hardware minimum. Unsupported sample rates are fatal.
    pub fn derive(
        config: &DriverConfig,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self, ConfigError> {
        let freqs = freq_catalog::lookup(config.sample_rate_us)?;
        debug!(
            sample_rate_us = config.sample_rate_us,
            ?freqs,
            "achievable pulse frequencies"
        );

        // derive() is callable without validate(); guard its own arithmetic
        if config.sectors == 0 {
            return Err(ConfigError::ValidationError("sectors must be >= 1".into()));
        }
        let full_rotation_pulses = config
            .microstep
            .checked_mul(BASE_STEPS_PER_REV)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "microstep {} overflows the pulses-per-revolution range",
                    config.microstep
                ))
            })?;
        let seconds_per_revolution = 60.0 / NORMAL_SPEED_RPM;
        let converter = TimingConverter::new(full_rotation_pulses);

        let raw_max_speed =
            converter.level_duration_to_speed(ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64(), sink);
        let hardware_max_speed_rpm = raw_max_speed.min(MAX_SPEED_RPM);

        let computed_min = converter.speed_to_level_duration(MAX_SPEED_RPM, sink);
        let min_level_duration = if computed_min < ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() {
            sink.emit(DiagnosticEvent::ClampedMinDuration {
                computed_us: computed_min * 1e6,
                clamped_us: ABSOLUTE_MIN_LEVEL_DURATION.as_secs_f64() * 1e6,
            });
            ABSOLUTE_MIN_LEVEL_DURATION
        } else {
            Duration::from_secs_f64(computed_min)
        };

        if full_rotation_pulses % config.sectors != 0 {
            sink.emit(DiagnosticEvent::ImpreciseSectorDivision {
                sectors: config.sectors,
                full_rotation_pulses,
            });
        }
        let pulses_per_sector = full_rotation_pulses / config.sectors;

        info!(
            full_rotation_pulses,
            pulses_per_sector,
            hardware_max_speed_rpm,
            min_level_duration_us = min_level_duration.as_secs_f64() * 1e6,
            "derived timing"
        );

        Ok(Self {
            full_rotation_pulses,
            seconds_per_revolution,
            pulses_per_sector,
            hardware_max_speed_rpm,
            min_level_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::MemorySink;

    #[test]
    fn defaults_are_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lines.pulse, Some(18));
        assert_eq!(config.lines.enable, Some(13));
        assert_eq!(config.lines.direction, Some(23));
        assert_eq!(config.microstep, 10);
        assert_eq!(config.sample_rate_us, 5);
        assert_eq!(config.sectors, 400);
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let config = DriverConfig {
            sample_rate_us: 3,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedSampleRate(3))
        ));
    }

    #[test]
    fn rejects_zero_microstep_and_sectors() {
        let config = DriverConfig {
            microstep: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        let config = DriverConfig {
            sectors: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_overflowing_microstep() {
        // 30_000_000 × 200 exceeds u32
        let config = DriverConfig {
            microstep: 30_000_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        // derive() guards its own arithmetic even when validate() is skipped
        let sink = MemorySink::default();
        assert!(matches!(
            DerivedTiming::derive(&config, &sink),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn derive_rejects_zero_sectors_without_validate() {
        let sink = MemorySink::default();
        let config = DriverConfig {
            sectors: 0,
            ..Default::default()
        };
        assert!(matches!(
            DerivedTiming::derive(&config, &sink),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_gear_ratio_outside_bounds() {
        for egr in [0.01, 25.0] {
            let config = DriverConfig {
                electronic_gear_ratio: Some(egr),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "egr {egr} accepted");
        }
        let config = DriverConfig {
            electronic_gear_ratio: Some(0.05),
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn full_rotation_pulses_scales_with_microstep() {
        let sink = MemorySink::default();
        for microstep in [1, 2, 10, 32, 64] {
            let config = DriverConfig {
                microstep,
                sectors: 200,
                ..Default::default()
            };
            let timing = DerivedTiming::derive(&config, &sink).unwrap();
            assert_eq!(timing.full_rotation_pulses, 200 * microstep);
        }
    }

    #[test]
    fn exact_sector_division_is_silent() {
        let sink = MemorySink::default();
        let config = DriverConfig {
            microstep: 10,
            sectors: 400,
            ..Default::default()
        };
        let timing = DerivedTiming::derive(&config, &sink).unwrap();
        assert_eq!(timing.pulses_per_sector, 5);
        assert_eq!(timing.pulses_per_sector * 400, timing.full_rotation_pulses);
        assert!(
            !sink
                .events()
                .iter()
                .any(|e| matches!(e, DiagnosticEvent::ImpreciseSectorDivision { .. }))
        );
    }

    #[test]
    fn inexact_sector_division_warns_and_truncates() {
        let sink = MemorySink::default();
        let config = DriverConfig {
            microstep: 10,
            sectors: 360,
            ..Default::default()
        };
        let timing = DerivedTiming::derive(&config, &sink).unwrap();
        assert_eq!(timing.pulses_per_sector, 5); // 2000 / 360 truncated
        assert!(sink.events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::ImpreciseSectorDivision { sectors: 360, .. }
        )));
    }

    #[test]
    fn oversubdivided_rotation_truncates_to_zero_pulses() {
        let sink = MemorySink::default();
        // more sectors than pulses per revolution: preserved as a warning,
        // not a rejection
        let config = DriverConfig {
            microstep: 1,
            sectors: 400,
            ..Default::default()
        };
        let timing = DerivedTiming::derive(&config, &sink).unwrap();
        assert_eq!(timing.pulses_per_sector, 0);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, DiagnosticEvent::ImpreciseSectorDivision { .. })));
    }

    #[test]
    fn min_level_duration_is_clamped_for_large_microstep() {
        let sink = MemorySink::default();
        // microstep 32 -> 6400 pulses/rev: 30/(2000*6400) ≈ 2.34 µs < 2.5 µs
        let config = DriverConfig {
            microstep: 32,
            sectors: 400,
            ..Default::default()
        };
        let timing = DerivedTiming::derive(&config, &sink).unwrap();
        assert_eq!(timing.min_level_duration, ABSOLUTE_MIN_LEVEL_DURATION);
        assert!((timing.hardware_max_speed_rpm - 1875.0).abs() < 1e-9);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, DiagnosticEvent::ClampedMinDuration { .. })));
    }

    #[test]
    fn min_level_duration_unclamped_for_small_microstep() {
        let sink = MemorySink::default();
        let config = DriverConfig {
            microstep: 10,
            sectors: 400,
            ..Default::default()
        };
        let timing = DerivedTiming::derive(&config, &sink).unwrap();
        // 30/(2000*2000) = 7.5 µs, above the hardware minimum
        assert_eq!(timing.min_level_duration, Duration::from_nanos(7_500));
        assert!((timing.hardware_max_speed_rpm - MAX_SPEED_RPM).abs() < 1e-9);
    }

    #[test]
    fn toml_round_trip_with_partial_bindings() {
        let toml_src = r#"
microstep = 4
sectors = 360

[lines]
pulse = 18
enable = 13
direction = 23
position_reached = 12
"#;
        let config: DriverConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.microstep, 4);
        assert_eq!(config.lines.position_reached, Some(12));
        assert_eq!(config.lines.alarm, None);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml_src = "microsteps = 4\n";
        assert!(toml::from_str::<DriverConfig>(toml_src).is_err());
    }
}
