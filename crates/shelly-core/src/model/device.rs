use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;

use shelly_api::auth::DEFAULT_USERNAME;
use shelly_api::{Credentials, DeviceGeneration};

/// A device the host wants the connector to manage.
///
/// Supplied by a [`DeviceRepository`](crate::DeviceRepository); the
/// connector never mutates it.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedDevice {
    /// Stable identifier, e.g. `shellyplus1pm-a8032ab12345` or a Gen1 MAC.
    pub identifier: String,
    pub generation: DeviceGeneration,
    /// IP address, optionally with a port (`192.168.1.20`, `10.0.0.5:8080`).
    pub ip_address: Option<String>,
    /// mDNS host name, used when no IP address is known.
    pub domain: Option<String>,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<SecretString>,
    /// Overrides the connector-wide minimum status-reading interval.
    pub status_reading_delay: Option<Duration>,
}

impl ManagedDevice {
    pub fn new(identifier: impl Into<String>, generation: DeviceGeneration) -> Self {
        Self {
            identifier: identifier.into(),
            generation,
            ip_address: None,
            domain: None,
            username: None,
            password: None,
            status_reading_delay: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.ip_address = Some(address.into());
        self
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Where to reach the device: the IP address if known, else the domain.
    pub fn address(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .or(self.domain.as_deref())
            .filter(|a| !a.trim().is_empty())
    }

    /// The IP this device pushes from, for matching CoAP datagrams.
    pub fn ip(&self) -> Option<IpAddr> {
        let raw = self.ip_address.as_deref()?;
        raw.parse::<IpAddr>()
            .ok()
            .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
    }

    /// Basic-auth credentials, present only when a password is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        let password = self.password.clone()?;
        let username = self.username.as_deref().unwrap_or(DEFAULT_USERNAME);
        Some(Credentials::new(username, password))
    }

    /// Whether the connector can manage this device at all.
    pub fn is_manageable(&self) -> bool {
        self.address().is_some() && self.generation != DeviceGeneration::Unknown
    }

    /// Match a CoAP identity (`device_id`) against this device. Gen1
    /// identifiers are either the bare id or `<model>-<id>`.
    pub fn matches_coap_id(&self, device_id: &str) -> bool {
        let ours = self.identifier.as_str();
        ours.eq_ignore_ascii_case(device_id)
            || ours
                .rsplit_once('-')
                .is_some_and(|(_, suffix)| suffix.eq_ignore_ascii_case(device_id))
    }
}
