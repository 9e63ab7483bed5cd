use serde::Serialize;
use strum::Display;

use shelly_api::{ComponentKind, DeviceIdentity, PropertyKey};

/// Value type of a property, for the host's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    Enum,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescription {
    pub identifier: PropertyKey,
    pub data_type: DataType,
    pub unit: Option<String>,
    /// Range (`0:100`) or allowed values (`open,close,stop`).
    pub format: Option<String>,
    pub settable: bool,
    pub queryable: bool,
    /// Raw reading the device uses for "not available", if it has one.
    pub invalid: Option<String>,
}

/// One device sub-component, e.g. `switch:0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescription {
    pub identifier: String,
    pub kind: ComponentKind,
    pub name: Option<String>,
    pub properties: Vec<PropertyDescription>,
}

/// Everything discovery learned about a device. Replaced wholesale when a
/// device is discovered again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescription {
    pub identity: DeviceIdentity,
    pub channels: Vec<ChannelDescription>,
}

impl DeviceDescription {
    pub fn property_count(&self) -> usize {
        self.channels.iter().map(|c| c.properties.len()).sum()
    }
}
