//! Configuration and Diagnostics Tests
//!
//! Validates loading the driver from a configuration file and dumping its
//! statistics.

use kernel_api::Errno;
use services_guest_device::{ConfigError, DriverConfig, LoadError, LogLevel, NodeKind, OpenFlags, EVENT_MOUSE_POSITION_CHANGED};
use std::io::Write;
use tests_guest_device::{interrupt, load, load_with, test_bootstrap, IRQ};

/// Test: Node names and major come from the configuration file
#[test]
fn test_load_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(
        file,
        r#"{{ "major": 240, "device_name": "guestctl", "user_device_name": "guestusr", "log_level": "debug" }}"#
    )
    .expect("Failed to write config");

    let config = DriverConfig::from_file(file.path()).expect("Failed to read config");
    assert_eq!(config.log_level, LogLevel::Debug);

    let (sim, core) = test_bootstrap();
    let driver = load_with(&sim, &core, config).expect("Failed to load driver");
    assert_eq!(sim.nodes.node_names(), vec!["guestctl", "guestusr"]);
    assert_eq!(sim.interrupts.handler_names(IRQ), vec!["guestctl".to_string()]);
    assert_eq!(driver.extension().name(), "guestctl");
    assert_eq!(driver.nodes().lookup("guestusr"), Some(NodeKind::User));
    assert!(driver.open_node("guestusr", OpenFlags::empty()).is_ok());
    assert_eq!(
        driver.open_node("vboxuser", OpenFlags::empty()).err(),
        Some(Errno::NoDevice)
    );
}

/// Test: Invalid configuration stops the load before the device is touched
#[test]
fn test_invalid_config_rejected() {
    let (sim, core) = test_bootstrap();
    let config = DriverConfig {
        device_name: String::new(),
        ..DriverConfig::default()
    };

    let err = load_with(&sim, &core, config).expect_err("Load should fail");
    assert_eq!(err, LoadError::Config(ConfigError::EmptyName("device_name")));
    assert_eq!(err.errno(), Errno::InvalidArgument);
    assert!(sim.audit().is_empty());
    assert!(core.calls().is_empty());
}

/// Test: Malformed configuration files are reported, not defaulted
#[test]
fn test_malformed_config_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "{{ \"major\": \"not a number\" }}").expect("Failed to write config");

    assert!(matches!(
        DriverConfig::from_file(file.path()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        DriverConfig::from_file(file.path().with_extension("missing")),
        Err(ConfigError::Io(_))
    ));
}

/// Test: Statistics serialize for diagnostics
#[test]
fn test_stats_dump() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let _handle = driver
        .open(NodeKind::User, OpenFlags::empty())
        .expect("Failed to open handle");
    interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);
    core.set_foreign(true);
    sim.raise_irq(IRQ);

    let json = serde_json::to_value(driver.stats()).expect("Failed to serialize stats");
    assert_eq!(json["interrupts_handled"], 1);
    assert_eq!(json["interrupts_spurious"], 1);
    assert_eq!(json["sessions_open"], 1);
    assert_eq!(json["protocol_violations"], 0);
}
