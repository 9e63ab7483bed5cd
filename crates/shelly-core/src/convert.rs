// ── Channel descriptions ──
//
// Build the channel/property schema of a device from what discovery
// fetched: the `/cit/d` description for Gen1, `Shelly.GetConfig` (narrowed
// by `Shelly.GetStatus`) for Gen2.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use shelly_api::gen1::Gen1Description;
use shelly_api::gen2::{Gen2Config, Gen2Status};
use shelly_api::property::channel_identifier;
use shelly_api::{Attribute, ComponentKind, DeviceGeneration, PropertyKey};

use crate::model::{ChannelDescription, DataType, PropertyDescription};
use crate::normalize::normalize_components;

const PERCENT_RANGE: &str = "0:100";
const GEN1_COVER_STATES: &str = "open,close,stop";
const GEN2_COVER_STATES: &str = "open,closed,opening,closing,stopped,calibrating";

/// Schema entry for one property.
pub fn describe_property(key: PropertyKey, generation: DeviceGeneration) -> PropertyDescription {
    let (data_type, unit, format) = match (key.kind, key.attribute) {
        (ComponentKind::Cover, Attribute::State) => {
            let states = if generation == DeviceGeneration::Gen1 {
                GEN1_COVER_STATES
            } else {
                GEN2_COVER_STATES
            };
            (DataType::Enum, None, Some(states))
        }
        (_, Attribute::On | Attribute::State) => (DataType::Boolean, None, None),
        (_, Attribute::Position | Attribute::Brightness) => {
            (DataType::Integer, Some("%"), Some(PERCENT_RANGE))
        }
        (_, Attribute::ActivePower) => (DataType::Float, Some("W"), None),
        (_, Attribute::PowerFactor) => (DataType::Float, None, None),
        (_, Attribute::ActiveEnergy) => (DataType::Float, Some("Wh"), None),
        (_, Attribute::Current) => (DataType::Float, Some("A"), None),
        (_, Attribute::Voltage) => (DataType::Float, Some("V"), None),
        (_, Attribute::Frequency) => (DataType::Float, Some("Hz"), None),
        (_, Attribute::Celsius) => (DataType::Float, Some("°C"), None),
        (_, Attribute::Fahrenheit) => (DataType::Float, Some("°F"), None),
        (_, Attribute::Humidity | Attribute::Percent) => (DataType::Float, Some("%"), None),
    };

    PropertyDescription {
        identifier: key,
        data_type,
        unit: unit.map(str::to_owned),
        format: format.map(str::to_owned),
        settable: key.is_settable(),
        queryable: true,
        invalid: None,
    }
}

// ── Gen1 ─────────────────────────────────────────────────────────────

/// Channels of a Gen1 device, one per block that maps onto a component.
pub fn gen1_channels(description: &Gen1Description) -> Vec<ChannelDescription> {
    let mut grouped: BTreeMap<(ComponentKind, u32), Vec<PropertyDescription>> = BTreeMap::new();

    for resolved in description.properties() {
        let key = resolved.key;
        let properties = grouped.entry((key.kind, key.id)).or_default();
        if properties.iter().any(|p| p.identifier == key) {
            continue;
        }
        let mut property = describe_property(key, DeviceGeneration::Gen1);
        property.invalid = resolved.sensor.invalid_value().map(sentinel_text);
        properties.push(property);
    }

    grouped
        .into_iter()
        .map(|((kind, id), mut properties)| {
            properties.sort_by_key(|p| attribute_rank(kind, p.identifier.attribute));
            ChannelDescription {
                identifier: channel_identifier(kind, id),
                kind,
                name: None,
                properties,
            }
        })
        .collect()
}

fn sentinel_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attribute_rank(kind: ComponentKind, attribute: Attribute) -> usize {
    kind.attributes()
        .iter()
        .position(|a| *a == attribute)
        .unwrap_or(usize::MAX)
}

// ── Gen2 ─────────────────────────────────────────────────────────────

/// Channels of a Gen2 device: every modelled component in the config.
///
/// When a status snapshot is available, read-only attributes the device
/// did not report are dropped. Settable attributes are always kept.
pub fn gen2_channels(config: &Gen2Config, status: Option<&Gen2Status>) -> Vec<ChannelDescription> {
    let reported: Option<BTreeSet<PropertyKey>> = status.map(|s| {
        normalize_components(&s.components)
            .into_iter()
            .map(|p| p.property)
            .collect()
    });
    let in_status: BTreeSet<(ComponentKind, u32)> = status
        .map(|s| s.components.iter().map(|c| (c.kind(), c.id())).collect())
        .unwrap_or_default();

    config
        .components()
        .into_iter()
        .map(|(kind, id, name)| {
            let properties = kind
                .attributes()
                .iter()
                .map(|attribute| PropertyKey::new(kind, id, *attribute))
                .filter(|key| match &reported {
                    Some(reported) if in_status.contains(&(kind, id)) => {
                        key.is_settable() || reported.contains(key)
                    }
                    _ => true,
                })
                .map(|key| describe_property(key, DeviceGeneration::Gen2))
                .collect();
            ChannelDescription {
                identifier: channel_identifier(kind, id),
                kind,
                name,
                properties,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn property_ids(channel: &ChannelDescription) -> Vec<String> {
        channel
            .properties
            .iter()
            .map(|p| p.identifier.to_string())
            .collect()
    }

    #[test]
    fn gen1_blocks_become_channels() {
        let description: Gen1Description = serde_json::from_value(json!({
            "blk": [{"I": 1, "D": "relay_0"}, {"I": 3, "D": "sensor_0"}],
            "sen": [
                {"I": 4101, "T": "P", "D": "power", "U": "W", "R": ["0/3500", "-1"], "L": 1},
                {"I": 1101, "T": "S", "D": "output", "R": "0/1", "L": 1},
                {"I": 3101, "T": "T", "D": "extTemp", "U": "C", "R": ["-55/125", "999"], "L": 3}
            ]
        }))
        .unwrap();

        let channels = gen1_channels(&description);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].identifier, "switch:0");
        assert_eq!(property_ids(&channels[0]), vec!["switch_0_on", "switch_0_active_power"]);
        assert_eq!(channels[0].properties[1].invalid.as_deref(), Some("-1"));
        assert!(channels[0].properties[0].settable);

        assert_eq!(channels[1].identifier, "temperature:0");
        assert_eq!(channels[1].properties[0].invalid.as_deref(), Some("999"));
        assert_eq!(channels[1].properties[0].unit.as_deref(), Some("°C"));
    }

    #[test]
    fn gen2_channels_follow_config_and_status() {
        let config: Gen2Config = serde_json::from_value(json!({
            "sys": {"device": {"name": null}},
            "switch:0": {"id": 0, "name": "Kettle"},
            "input:0": {"id": 0, "name": null}
        }))
        .unwrap();
        let status = Gen2Status::from_value(&json!({
            "switch:0": {"id": 0, "output": true, "apower": 0.0, "voltage": 231.2}
        }))
        .unwrap();

        let channels = gen2_channels(&config, Some(&status));
        assert_eq!(channels.len(), 2);

        let switch = channels.iter().find(|c| c.kind == ComponentKind::Switch).unwrap();
        assert_eq!(switch.name.as_deref(), Some("Kettle"));
        assert_eq!(
            property_ids(switch),
            vec!["switch_0_on", "switch_0_active_power", "switch_0_voltage"]
        );

        // Not in the status snapshot: keep the full attribute table.
        let input = channels.iter().find(|c| c.kind == ComponentKind::Input).unwrap();
        assert_eq!(property_ids(input), vec!["input_0_state", "input_0_percent"]);
    }

    #[test]
    fn gen2_without_status_lists_every_attribute() {
        let config: Gen2Config = serde_json::from_value(json!({"cover:0": {"id": 0}})).unwrap();
        let channels = gen2_channels(&config, None);
        assert_eq!(channels[0].properties.len(), ComponentKind::Cover.attributes().len());

        let state = &channels[0].properties[0];
        assert_eq!(state.data_type, DataType::Enum);
        assert_eq!(state.format.as_deref(), Some(GEN2_COVER_STATES));
    }

    #[test]
    fn percent_properties_are_integers() {
        let key = PropertyKey::new(ComponentKind::Light, 0, Attribute::Brightness);
        let desc = describe_property(key, DeviceGeneration::Gen2);
        assert_eq!(desc.data_type, DataType::Integer);
        assert_eq!(desc.format.as_deref(), Some("0:100"));
        assert!(desc.settable);
    }
}
