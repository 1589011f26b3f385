//! End-to-end driver tests over the simulation GPIO backend.
//!
//! Construction from TOML files, the full command surface, settle-window
//! observance on the recorded op log, and the shutdown contract.

use std::sync::Arc;
use std::time::Duration;

use pulsedrive_driver::{
    DiagnosticEvent, DiagnosticSink, Driver, DriverConfig, Level, LineRole, MemorySink, Severity,
    SimGpioBus,
};
use tempfile::TempDir;

fn build(config: DriverConfig) -> (Driver<SimGpioBus>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let driver = Driver::new(
        config,
        SimGpioBus::new(),
        sink.clone() as Arc<dyn DiagnosticSink>,
    )
    .expect("driver construction failed");
    (driver, sink)
}

#[test]
fn loads_config_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("driver.toml");
    std::fs::write(
        &path,
        r#"
microstep = 10
sectors = 400
sample_rate_us = 5

[lines]
pulse = 18
enable = 13
direction = 23
"#,
    )
    .unwrap();

    let config = DriverConfig::load(&path).unwrap();
    let (driver, _) = build(config);
    assert_eq!(driver.timing().full_rotation_pulses, 2000);
    assert_eq!(driver.timing().pulses_per_sector, 5);
}

#[test]
fn bad_sample_rate_in_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("driver.toml");
    std::fs::write(&path, "sample_rate_us = 7\n").unwrap();
    assert!(DriverConfig::load(&path).is_err());
}

#[test]
fn missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    assert!(DriverConfig::load(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn sector_move_scenario() {
    // microstep 10, 400 sectors: 5 pulses per sector
    let (mut driver, sink) = build(DriverConfig::default());
    sink.take(); // discard construction-time events
    driver.rotate_by_sector(-10.0, Some(500.0)).unwrap();

    let pulses = driver.bus().writes_to(18).len() / 2;
    assert_eq!(pulses, 50);
    assert_eq!(driver.read_level(LineRole::Direction).unwrap(), Level::Low);
    // in-range speed command: no warnings beyond level-change infos
    assert!(!sink
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::SpeedAboveMax { .. })));
    assert_eq!(sink.count_with_severity(Severity::Warning), 0);
}

#[test]
fn direction_settle_precedes_pulse_train() {
    let (mut driver, _) = build(DriverConfig::default());
    driver.rotate_by_sector(-1.0, None).unwrap();

    let dir_low = driver
        .bus()
        .writes_to(23)
        .into_iter()
        .last()
        .expect("no DIR write");
    let first_pulse = driver.bus().writes_to(18)[0];
    assert!(first_pulse.at > dir_low.at);
    assert!(
        first_pulse.at - dir_low.at >= Duration::from_micros(100),
        "DIR settle window violated"
    );
}

#[test]
fn speed_move_with_hardware_ceiling() {
    // microstep 32: hardware max is 1875 rpm, below the absolute ceiling
    let config = DriverConfig {
        microstep: 32,
        ..Default::default()
    };
    let (mut driver, _) = build(config);
    assert!((driver.timing().hardware_max_speed_rpm - 1875.0).abs() < 1e-9);

    let writes_before = driver.bus().write_count();
    assert!(driver.rotate_by_speed(1900.0, 0.5).is_err());
    assert_eq!(driver.bus().write_count(), writes_before);

    driver.rotate_by_speed(100.0, 0.0005).unwrap();
    // 100/60 × 6400 = 10666 pulses/s × 0.5 ms -> 5 pulses (+ forced LOW)
    assert_eq!(driver.bus().writes_to(18).len(), 11);
}

#[test]
fn toggle_via_driver_surface() {
    let (mut driver, _) = build(DriverConfig::default());
    assert_eq!(driver.read_level(LineRole::Enable).unwrap(), Level::Low);
    assert_eq!(driver.set_level(LineRole::Enable, None).unwrap(), Level::High);
    assert_eq!(driver.read_level(LineRole::Enable).unwrap(), Level::High);
}

#[test]
fn snapshot_serializes_to_json() {
    let (driver, _) = build(DriverConfig::default());
    let json = serde_json::to_value(driver.snapshot()).unwrap();
    assert_eq!(json["lines"]["enable"], "LOW");
    assert_eq!(json["lines"]["direction"], "HIGH");
    assert_eq!(json["timing"]["pulses_per_sector"], 5);
}

#[test]
fn stop_contract_holds_under_write_failure() {
    let (mut driver, _) = build(DriverConfig::default());
    driver.bus_mut().fail_writes_on(18);
    assert!(driver.stop().is_err());
    assert!(driver.bus().is_released());
    // ENA still reached its safe level before release
    assert_eq!(driver.bus().level(13), Level::High);
}
