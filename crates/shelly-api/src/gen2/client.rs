// Gen2 HTTP RPC client
//
// Reads go through the `GET /rpc/<Method>` shortcut, which returns the bare
// result object. Writes are posted as full JSON-RPC frames to `/rpc` so the
// device's error object comes back intact.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::models::{Gen2Config, Gen2DeviceInfo, Gen2Status, RpcFrame, RpcRequest, set_command};
use crate::auth::{Credentials, authorize};
use crate::device::{DeviceGeneration, DeviceIdentity};
use crate::error::Error;
use crate::property::{PropertyKey, PropertyValue};
use crate::transport::{TransportConfig, device_url, parse_json, resolve_ip};

/// `src` field we put on outgoing frames.
pub const RPC_SOURCE: &str = "shelly-local";

/// HTTP client for Gen2 devices.
#[derive(Debug)]
pub struct Gen2Client {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl Gen2Client {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(transport.build_client()?))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            next_id: AtomicU64::new(1),
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `Shelly.GetDeviceInfo`, mapped to a device identity. Readable
    /// without credentials.
    pub async fn get_device_information(&self, address: &str) -> Result<DeviceIdentity, Error> {
        let info: Gen2DeviceInfo = self.get(address, "Shelly.GetDeviceInfo", None).await?;
        let generation = DeviceGeneration::from_number(info.generation);
        if generation != DeviceGeneration::Gen2 {
            return Err(Error::UnexpectedGeneration(info.generation));
        }
        let ip = resolve_ip(address).await?;

        Ok(DeviceIdentity {
            id: info.id,
            model: info.model,
            mac_address: info.mac.replace(':', "").to_ascii_uppercase(),
            firmware_version: info.ver,
            auth_enabled: info.auth_en,
            generation,
            ip_address: ip,
            domain: None,
        })
    }

    /// `Shelly.GetConfig`.
    pub async fn get_device_configuration(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Gen2Config, Error> {
        self.get(address, "Shelly.GetConfig", credentials).await
    }

    /// `Shelly.GetStatus`.
    pub async fn get_device_status(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Gen2Status, Error> {
        self.get(address, "Shelly.GetStatus", credentials).await
    }

    /// Write a single property (`Switch.Set`, `Cover.GoToPosition`, ...).
    pub async fn set_device_state(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        property: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<Value, Error> {
        let (method, params) = set_command(property, value)?;
        self.call(address, credentials, method, Some(params)).await
    }

    /// Post one JSON-RPC frame and return its `result`.
    pub async fn call(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        let url = device_url(address, "/rpc")?;
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            src: RPC_SOURCE.to_owned(),
            method: method.to_owned(),
            params,
        };
        debug!(%url, method, id = request.id, "POST rpc");

        let resp = authorize(self.http.post(url).json(&request), credentials)
            .send()
            .await
            .map_err(Error::Transport)?;
        let frame: RpcFrame = parse_json(resp).await?;

        if let Some(error) = frame.error {
            if error.code == 401 {
                return Err(Error::Unauthorized);
            }
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(frame.result.unwrap_or(Value::Null))
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        address: &str,
        method: &str,
        credentials: Option<&Credentials>,
    ) -> Result<T, Error> {
        let url = device_url(address, &format!("/rpc/{method}"))?;
        debug!("GET {}", url);

        let resp = authorize(self.http.get(url), credentials)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_json(resp).await
    }
}
