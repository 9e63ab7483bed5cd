//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::time::Duration;

use shelly_config::Config;
use shelly_core::{ConnectorConfig, DeviceGeneration, ManagedDevice};

use crate::cli::{GlobalOpts, TargetArgs};
use crate::error::CliError;

/// Config file selected by `--config`, or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(shelly_config::config_path)
}

/// Load the config file plus `SHELLY_` environment overrides.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(shelly_config::load_config_from(&config_file(global))?)
}

/// Runtime connector config with CLI flag overrides applied.
pub fn connector_config(cfg: &Config, global: &GlobalOpts) -> Result<ConnectorConfig, CliError> {
    let mut config = cfg.connector_config()?;
    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be greater than zero".into(),
            });
        }
        config.request_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

/// Resolve a command-line device target.
///
/// A configured identifier wins; anything else is treated as an address
/// and gets the shared credentials.
pub fn resolve_target(cfg: &Config, target: &TargetArgs) -> ManagedDevice {
    if let Some(entry) = cfg.device(&target.device) {
        let mut device = cfg.managed_device(entry);
        if let Some(generation) = target.generation {
            device.generation = generation;
        }
        return device;
    }

    let mut device = ManagedDevice::new(
        target.device.clone(),
        target.generation.unwrap_or(DeviceGeneration::Unknown),
    )
    .with_address(target.device.clone());
    if let Some(credentials) = cfg.default_credentials() {
        device.username = Some(credentials.username);
        device.password = Some(credentials.password);
    }
    device
}

#[cfg(test)]
mod tests {
    use shelly_config::DeviceEntry;

    use super::*;

    fn target(device: &str, generation: Option<DeviceGeneration>) -> TargetArgs {
        TargetArgs {
            device: device.into(),
            generation,
        }
    }

    #[test]
    fn configured_identifier_uses_its_entry() {
        let mut cfg = Config::default();
        cfg.credentials.use_keyring = false;
        let mut entry = DeviceEntry::new("plug", DeviceGeneration::Gen2);
        entry.address = Some("10.0.0.4".into());
        cfg.devices.push(entry);

        let device = resolve_target(&cfg, &target("plug", None));
        assert_eq!(device.address(), Some("10.0.0.4"));
        assert_eq!(device.generation, DeviceGeneration::Gen2);
    }

    #[test]
    fn unknown_target_is_an_address() {
        let mut cfg = Config::default();
        cfg.credentials.use_keyring = false;

        let device = resolve_target(&cfg, &target("10.0.0.9:8080", Some(DeviceGeneration::Gen1)));
        assert_eq!(device.address(), Some("10.0.0.9:8080"));
        assert_eq!(device.generation, DeviceGeneration::Gen1);
    }
}
