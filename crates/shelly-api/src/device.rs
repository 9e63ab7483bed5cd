// Device identity shared by both generations.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Hardware generation of a Shelly device.
///
/// The two generations speak entirely different protocols: Gen1 exposes a
/// REST API plus CoIoT multicast pushes, Gen2 exposes JSON-RPC over HTTP
/// and WebSocket.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceGeneration {
    #[default]
    Unknown,
    Gen1,
    Gen2,
}

impl DeviceGeneration {
    /// Map the numeric `gen` field reported by the device.
    pub fn from_number(number: u8) -> Self {
        match number {
            1 => Self::Gen1,
            n if n >= 2 => Self::Gen2,
            _ => Self::Unknown,
        }
    }
}

/// Immutable identity of a device, as reported by its info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub model: String,
    pub mac_address: String,
    pub firmware_version: String,
    pub auth_enabled: bool,
    pub generation: DeviceGeneration,
    pub ip_address: IpAddr,
    pub domain: Option<String>,
}
