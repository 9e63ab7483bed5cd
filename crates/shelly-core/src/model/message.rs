use chrono::{DateTime, Utc};
use serde::Serialize;

use shelly_api::{FailureKind, PropertyKey, PropertyValue};

use super::{ConnectionState, DeviceDescription};

/// One normalized reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyStatus {
    pub property: PropertyKey,
    pub value: PropertyValue,
}

impl PropertyStatus {
    pub fn new(property: PropertyKey, value: impl Into<PropertyValue>) -> Self {
        Self {
            property,
            value: value.into(),
        }
    }
}

/// Messages emitted to the host queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorMessage {
    DeviceFound {
        description: DeviceDescription,
        at: DateTime<Utc>,
    },
    DeviceState {
        device: String,
        state: ConnectionState,
        /// Why the state changed, for failure transitions.
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<FailureKind>,
        at: DateTime<Utc>,
    },
    PropertyStatus {
        device: String,
        channel: String,
        #[serde(flatten)]
        status: PropertyStatus,
        at: DateTime<Utc>,
    },
    DiscoveryFinished {
        found: usize,
        at: DateTime<Utc>,
    },
}

impl ConnectorMessage {
    pub fn device_found(description: DeviceDescription) -> Self {
        Self::DeviceFound {
            description,
            at: Utc::now(),
        }
    }

    pub fn device_state(
        device: impl Into<String>,
        state: ConnectionState,
        cause: Option<FailureKind>,
    ) -> Self {
        Self::DeviceState {
            device: device.into(),
            state,
            cause,
            at: Utc::now(),
        }
    }

    pub fn property_status(device: impl Into<String>, status: PropertyStatus) -> Self {
        Self::PropertyStatus {
            device: device.into(),
            channel: status.property.channel(),
            status,
            at: Utc::now(),
        }
    }

    pub fn discovery_finished(found: usize) -> Self {
        Self::DiscoveryFinished {
            found,
            at: Utc::now(),
        }
    }

    /// Device identifier this message is about, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::DeviceFound { description, .. } => Some(&description.identity.id),
            Self::DeviceState { device, .. } | Self::PropertyStatus { device, .. } => Some(device),
            Self::DiscoveryFinished { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shelly_api::{Attribute, ComponentKind};

    use super::*;

    #[test]
    fn property_status_carries_its_channel() {
        let key = PropertyKey::new(ComponentKind::Cover, 1, Attribute::Position);
        let msg = ConnectorMessage::property_status("dev", PropertyStatus::new(key, 40_i64));
        let ConnectorMessage::PropertyStatus { channel, .. } = &msg else {
            panic!("expected PropertyStatus");
        };
        assert_eq!(channel, "cover:1");
        assert_eq!(msg.device(), Some("dev"));
    }

    #[test]
    fn serializes_as_tagged_json() {
        let key = PropertyKey::new(ComponentKind::Switch, 0, Attribute::On);
        let msg = ConnectorMessage::property_status("dev", PropertyStatus::new(key, true));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "property_status");
        assert_eq!(json["property"], "switch_0_on");
        assert_eq!(json["value"], true);
    }
}
