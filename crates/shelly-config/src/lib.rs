//! Shared configuration for the Shelly tools.
//!
//! TOML file plus `SHELLY_` environment overrides, password resolution
//! (env var, then system keyring, then plaintext) and translation into
//! `shelly_core::ConnectorConfig` and the list of managed devices.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use shelly_core::{ConnectorConfig, Credentials, DeviceGeneration, ManagedDevice};

/// Keyring service name. Accounts are device identifiers, plus
/// [`DEFAULT_ACCOUNT`] for the shared password.
pub const KEYRING_SERVICE: &str = "shelly";

/// Keyring account holding the password shared by all devices.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Environment variable consulted for the shared password.
pub const PASSWORD_ENV: &str = "SHELLY_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connector: ConnectorSection,

    /// Credentials used for every device without its own.
    #[serde(default)]
    pub credentials: CredentialsSection,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// `[connector]`: timing and network knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorSection {
    pub poll_tick_ms: u64,
    /// Minimum seconds between two status reads of one device.
    pub status_reading_delay_secs: u64,
    /// Minimum seconds between two WebSocket connection attempts.
    pub reconnect_cool_down_secs: u64,
    pub request_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub coap_enabled: bool,
    /// Local interface for the multicast sockets.
    pub bind_address: Ipv4Addr,
}

impl Default for ConnectorSection {
    fn default() -> Self {
        let defaults = ConnectorConfig::default();
        Self {
            poll_tick_ms: millis(defaults.poll_tick),
            status_reading_delay_secs: defaults.status_reading_delay.as_secs(),
            reconnect_cool_down_secs: defaults.reconnect_cool_down.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            discovery_timeout_secs: defaults.discovery_timeout.as_secs(),
            coap_enabled: defaults.coap_enabled,
            bind_address: defaults.bind_address,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `[credentials]`: the shared fallback login.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub username: Option<String>,

    /// Plaintext password. Prefer the keyring or an env var.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Consult the system keyring while resolving passwords.
    pub use_keyring: bool,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            password_env: None,
            use_keyring: true,
        }
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub identifier: String,

    /// `gen1`, `gen2` or `unknown` (probe on first use).
    #[serde(default)]
    pub generation: DeviceGeneration,

    /// IP address, optionally with a port.
    pub address: Option<String>,

    /// mDNS host name, used when no address is set.
    pub domain: Option<String>,

    pub username: Option<String>,

    /// Plaintext password. Prefer the keyring or an env var.
    pub password: Option<String>,

    pub password_env: Option<String>,

    /// Overrides `connector.status_reading_delay_secs`.
    pub status_reading_delay_secs: Option<u64>,
}

impl DeviceEntry {
    pub fn new(identifier: impl Into<String>, generation: DeviceGeneration) -> Self {
        Self {
            identifier: identifier.into(),
            generation,
            address: None,
            domain: None,
            username: None,
            password: None,
            password_env: None,
            status_reading_delay_secs: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "shelly", "shelly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("shelly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment overrides use `__` between levels, e.g.
/// `SHELLY_CONNECTOR__POLL_TICK_MS=20`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SHELLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Keyring ─────────────────────────────────────────────────────────

/// Store a password in the system keyring under `account`.
pub fn store_password(account: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, account)?.set_password(password)?;
    Ok(())
}

fn keyring_password(account: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, account).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

// ── Translation into runtime types ──────────────────────────────────

impl Config {
    /// Runtime connector tuning.
    pub fn connector_config(&self) -> Result<ConnectorConfig, ConfigError> {
        let c = &self.connector;
        if c.poll_tick_ms == 0 {
            return Err(ConfigError::Validation {
                field: "connector.poll_tick_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if c.request_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "connector.request_timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(ConnectorConfig {
            poll_tick: Duration::from_millis(c.poll_tick_ms),
            status_reading_delay: Duration::from_secs(c.status_reading_delay_secs),
            reconnect_cool_down: Duration::from_secs(c.reconnect_cool_down_secs),
            request_timeout: Duration::from_secs(c.request_timeout_secs),
            discovery_timeout: Duration::from_secs(c.discovery_timeout_secs),
            coap_enabled: c.coap_enabled,
            bind_address: c.bind_address,
        })
    }

    /// Every `[[devices]]` entry with passwords resolved.
    ///
    /// Identifiers must be non-empty and unique.
    pub fn managed_devices(&self) -> Result<Vec<ManagedDevice>, ConfigError> {
        self.managed_devices_with(&|name| std::env::var(name).ok())
    }

    /// Look up one configured device by identifier (case-insensitive).
    pub fn device(&self, identifier: &str) -> Option<&DeviceEntry> {
        self.devices
            .iter()
            .find(|d| d.identifier.eq_ignore_ascii_case(identifier))
    }

    /// The shared login, used for discovery and unconfigured devices.
    pub fn default_credentials(&self) -> Option<Credentials> {
        self.default_credentials_with(&|name| std::env::var(name).ok())
    }

    /// Runtime device for one entry.
    pub fn managed_device(&self, entry: &DeviceEntry) -> ManagedDevice {
        self.managed_device_with(entry, &|name| std::env::var(name).ok())
    }

    fn managed_devices_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Vec<ManagedDevice>, ConfigError> {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(self.devices.len());

        for entry in &self.devices {
            let id = entry.identifier.trim();
            if id.is_empty() {
                return Err(ConfigError::Validation {
                    field: "devices.identifier".into(),
                    reason: "must not be empty".into(),
                });
            }
            if !seen.insert(id.to_ascii_lowercase()) {
                return Err(ConfigError::Validation {
                    field: "devices.identifier".into(),
                    reason: format!("duplicate device '{id}'"),
                });
            }
            devices.push(self.managed_device_with(entry, env));
        }
        Ok(devices)
    }

    fn managed_device_with(
        &self,
        entry: &DeviceEntry,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> ManagedDevice {
        ManagedDevice {
            identifier: entry.identifier.trim().to_owned(),
            generation: entry.generation,
            ip_address: entry.address.clone(),
            domain: entry.domain.clone(),
            username: entry
                .username
                .clone()
                .or_else(|| self.credentials.username.clone()),
            password: self.resolve_password_with(entry, env),
            status_reading_delay: entry.status_reading_delay_secs.map(Duration::from_secs),
        }
    }

    fn default_credentials_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Option<Credentials> {
        let password = self.shared_password(env)?;
        let username = self
            .credentials
            .username
            .clone()
            .unwrap_or_else(|| shelly_core::DEFAULT_USERNAME.to_owned());
        Some(Credentials::new(username, password))
    }

    /// Device password: the device's own env var, keyring entry and
    /// plaintext, then the shared password.
    fn resolve_password_with(
        &self,
        entry: &DeviceEntry,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Option<SecretString> {
        // 1. Device env var
        if let Some(value) = entry.password_env.as_deref().and_then(env) {
            return Some(SecretString::from(value));
        }

        // 2. Keyring, keyed by identifier
        if self.credentials.use_keyring {
            if let Some(secret) = keyring_password(entry.identifier.trim()) {
                return Some(secret);
            }
        }

        // 3. Plaintext in config
        if let Some(ref pw) = entry.password {
            return Some(SecretString::from(pw.clone()));
        }

        self.shared_password(env)
    }

    fn shared_password(&self, env: &dyn Fn(&str) -> Option<String>) -> Option<SecretString> {
        let env_name = self
            .credentials
            .password_env
            .as_deref()
            .unwrap_or(PASSWORD_ENV);
        if let Some(value) = env(env_name) {
            return Some(SecretString::from(value));
        }

        if self.credentials.use_keyring {
            if let Some(secret) = keyring_password(DEFAULT_ACCOUNT) {
                return Some(secret);
            }
        }

        self.credentials
            .password
            .as_ref()
            .map(|pw| SecretString::from(pw.clone()))
    }
}
