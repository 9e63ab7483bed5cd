// Gen1 HTTP client
//
// Plain REST over HTTP. `/shelly` is always open; everything else needs
// Basic auth when the device has a password set.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{Gen1Description, Gen1DeviceInfo, Gen1Status, set_request};
use crate::auth::{Credentials, authorize};
use crate::device::{DeviceGeneration, DeviceIdentity};
use crate::error::Error;
use crate::property::{PropertyKey, PropertyValue};
use crate::transport::{TransportConfig, check_status, device_url, parse_json, resolve_ip};

/// HTTP client for Gen1 devices. Stateless; one instance serves every
/// device, addressed per call.
#[derive(Debug, Clone)]
pub struct Gen1Client {
    http: reqwest::Client,
}

impl Gen1Client {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /shelly`, mapped to a device identity.
    pub async fn get_device_information(
        &self,
        address: &str,
    ) -> Result<DeviceIdentity, Error> {
        let info: Gen1DeviceInfo = self.get(address, "/shelly", None).await?;
        let ip = resolve_ip(address).await?;
        let mac = info.mac.replace(':', "").to_ascii_uppercase();
        Ok(DeviceIdentity {
            id: mac.clone(),
            model: info.model,
            mac_address: mac,
            firmware_version: info.fw,
            auth_enabled: info.auth,
            generation: DeviceGeneration::Gen1,
            ip_address: ip,
            domain: None,
        })
    }

    /// `GET /cit/d`: the block/sensor description.
    pub async fn get_device_description(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Gen1Description, Error> {
        self.get(address, "/cit/d", credentials).await
    }

    /// `GET /cit/s`: current readings, same shape as a CoAP push.
    pub async fn get_device_status(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Gen1Status, Error> {
        self.get(address, "/cit/s", credentials).await
    }

    /// Write a single property through the REST action endpoints.
    pub async fn set_device_state(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        property: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        let (path, query) = set_request(property, value)?;
        let url = device_url(address, &path)?;
        debug!(%url, property = %property, value = %value, "Gen1 set");

        let request = authorize(self.http.get(url).query(&query), credentials);
        let resp = request.send().await.map_err(Error::Transport)?;
        check_status(resp).await.map(|_| ())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        address: &str,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<T, Error> {
        let url = device_url(address, path)?;
        debug!("GET {}", url);

        let resp = authorize(self.http.get(url), credentials)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_json(resp).await
    }
}
