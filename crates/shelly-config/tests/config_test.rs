// Loading and saving config files with tempfile.

#![allow(clippy::unwrap_used)]

use std::net::Ipv4Addr;
use std::time::Duration;

use pretty_assertions::assert_eq;
use shelly_config::{Config, ConfigError, DeviceEntry, load_config_from, save_config_to};
use shelly_core::DeviceGeneration;

// ── Helpers ─────────────────────────────────────────────────────────

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert!(config.devices.is_empty());
    assert!(config.credentials.use_keyring);
    assert_eq!(config.connector.status_reading_delay_secs, 15);
}

#[test]
fn test_full_file_translates_to_runtime_types() {
    let (_dir, path) = write_config(
        r#"
[connector]
poll_tick_ms = 25
status_reading_delay_secs = 60
coap_enabled = false
bind_address = "192.168.1.10"

[credentials]
username = "admin"
password = "shared-secret"
use_keyring = false

[[devices]]
identifier = "shellyplus1pm-a8032ab12345"
generation = "gen2"
address = "192.168.1.20"

[[devices]]
identifier = "shelly1-E868E7F1A2B3"
generation = "gen1"
domain = "shelly1-e868e7f1a2b3.local"
status_reading_delay_secs = 5
"#,
    );

    let config = load_config_from(&path).unwrap();

    let runtime = config.connector_config().unwrap();
    assert_eq!(runtime.poll_tick, Duration::from_millis(25));
    assert_eq!(runtime.status_reading_delay, Duration::from_secs(60));
    assert!(!runtime.coap_enabled);
    assert_eq!(runtime.bind_address, Ipv4Addr::new(192, 168, 1, 10));
    // Unset keys keep their defaults.
    assert_eq!(runtime.reconnect_cool_down, Duration::from_secs(300));

    let devices = config.managed_devices().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].generation, DeviceGeneration::Gen2);
    assert_eq!(devices[0].address(), Some("192.168.1.20"));
    assert_eq!(devices[1].address(), Some("shelly1-e868e7f1a2b3.local"));
    assert_eq!(devices[1].status_reading_delay, Some(Duration::from_secs(5)));
    assert!(devices.iter().all(|d| d.password.is_some()));

    assert!(config.device("SHELLYPLUS1PM-A8032AB12345").is_some());
}

#[test]
fn test_unknown_generation_string_is_an_error() {
    let (_dir, path) = write_config(
        r#"
[[devices]]
identifier = "plug"
generation = "gen9"
"#,
    );

    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::Figment(_))
    ));
}

#[test]
fn test_saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.connector.request_timeout_secs = 3;
    let mut entry = DeviceEntry::new("shellyplug-s-C4DD57", DeviceGeneration::Gen1);
    entry.address = Some("10.0.0.7:8080".into());
    config.devices.push(entry);

    save_config_to(&config, &path).unwrap();
    let loaded = load_config_from(&path).unwrap();

    assert_eq!(loaded.connector.request_timeout_secs, 3);
    assert_eq!(loaded.devices.len(), 1);
    assert_eq!(loaded.devices[0].identifier, "shellyplug-s-C4DD57");
    assert_eq!(loaded.devices[0].address.as_deref(), Some("10.0.0.7:8080"));
    assert_eq!(loaded.devices[0].generation, DeviceGeneration::Gen1);
}
