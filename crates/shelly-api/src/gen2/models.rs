// Gen2 RPC payloads: device info, config, status, and the JSON-RPC frames
// that carry them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::component::{
    Component, CoverStatus, HumidityStatus, InputStatus, LightStatus, PowerMeterStatus,
    SwitchStatus, TemperatureStatus, VoltmeterStatus, available,
};
use crate::error::Error;
use crate::gen1::percent;
use crate::property::{Attribute, ComponentKind, PropertyKey, PropertyValue};

// ── Shelly.GetDeviceInfo ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen2DeviceInfo {
    pub id: String,
    pub mac: String,
    pub model: String,
    #[serde(rename = "gen")]
    pub generation: u8,
    #[serde(default)]
    pub fw_id: String,
    #[serde(default)]
    pub ver: String,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_en: bool,
    #[serde(default)]
    pub auth_domain: Option<String>,
}

// ── Component keys ───────────────────────────────────────────────────

/// Split a Gen2 component key (`switch:0`, `pm1:1`) into kind and id.
/// Keys for components this crate does not model yield `None`.
pub fn parse_component_key(key: &str) -> Option<(ComponentKind, u32)> {
    let (kind, id) = key.split_once(':')?;
    Some((kind.parse().ok()?, id.parse().ok()?))
}

// ── Shelly.GetConfig ─────────────────────────────────────────────────

/// Device configuration: one object per component, keyed like the status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gen2Config(pub Map<String, Value>);

impl Gen2Config {
    /// Modelled components with their configured names, ordered by kind and id.
    pub fn components(&self) -> Vec<(ComponentKind, u32, Option<String>)> {
        let mut found: Vec<_> = self
            .0
            .iter()
            .filter_map(|(key, config)| {
                let (kind, id) = parse_component_key(key)?;
                let name = config.get("name").and_then(Value::as_str).map(str::to_owned);
                Some((kind, id, name))
            })
            .collect();
        found.sort_by_key(|(kind, id, _)| (*kind, *id));
        found
    }
}

// ── Shelly.GetStatus / NotifyStatus ──────────────────────────────────

/// Status of every modelled component in a status object. Notifications
/// carry only changed fields, so every reading is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gen2Status {
    pub components: Vec<Component>,
}

impl Gen2Status {
    /// Decode a `Shelly.GetStatus` result or notification `params` object.
    ///
    /// Unknown component keys (`sys`, `wifi`, `ble`, ...) are ignored; a
    /// modelled component with a malformed body fails the whole status.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let Some(object) = value.as_object() else {
            return Err(serde::de::Error::custom("status must be a JSON object"));
        };

        let mut components = Vec::new();
        for (key, body) in object {
            let Some((kind, id)) = parse_component_key(key) else {
                continue;
            };
            components.push(decode_component(kind, id, body.clone())?);
        }
        components.sort_by_key(|c| (c.kind(), c.id()));
        Ok(Self { components })
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<'de> Deserialize<'de> for Gen2Status {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn decode_component(kind: ComponentKind, id: u32, body: Value) -> Result<Component, serde_json::Error> {
    Ok(match kind {
        ComponentKind::Switch => {
            let w: SwitchWire = serde_json::from_value(body)?;
            Component::Switch(SwitchStatus {
                id,
                output: w.output,
                active_power: w.apower,
                power_factor: w.pf,
                active_energy: w.aenergy.and_then(|e| e.total),
                current: w.current,
                voltage: w.voltage,
                celsius: w.temperature.and_then(|t| t.celsius),
            })
        }
        ComponentKind::Cover => {
            let w: CoverWire = serde_json::from_value(body)?;
            Component::Cover(CoverStatus {
                id,
                state: w.state,
                position: w.current_pos,
                active_power: w.apower,
                power_factor: w.pf,
                active_energy: w.aenergy.and_then(|e| e.total),
                current: w.current,
                voltage: w.voltage,
                celsius: w.temperature.and_then(|t| t.celsius),
            })
        }
        ComponentKind::Light => {
            let w: LightWire = serde_json::from_value(body)?;
            Component::Light(LightStatus {
                id,
                output: w.output,
                brightness: w.brightness,
            })
        }
        ComponentKind::Input => {
            let w: InputWire = serde_json::from_value(body)?;
            Component::Input(InputStatus {
                id,
                state: w.state,
                percent: w.percent,
            })
        }
        ComponentKind::Temperature => {
            let w: TemperatureWire = serde_json::from_value(body)?;
            Component::Temperature(TemperatureStatus {
                id,
                celsius: w.celsius,
                fahrenheit: w.fahrenheit,
            })
        }
        ComponentKind::Humidity => {
            let w: HumidityWire = serde_json::from_value(body)?;
            Component::Humidity(HumidityStatus { id, relative: w.rh })
        }
        ComponentKind::Voltmeter => {
            let w: VoltmeterWire = serde_json::from_value(body)?;
            Component::Voltmeter(VoltmeterStatus {
                id,
                voltage: w.voltage,
            })
        }
        ComponentKind::PowerMeter => {
            let w: PowerMeterWire = serde_json::from_value(body)?;
            Component::PowerMeter(PowerMeterStatus {
                id,
                active_power: w.apower,
                voltage: w.voltage,
                current: w.current,
                frequency: w.freq,
                active_energy: w.aenergy.and_then(|e| e.total),
            })
        }
    })
}

// Wire shapes. Absent fields and "not available" markers both land as None.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnergyWire {
    #[serde(deserialize_with = "available")]
    total: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TemperatureWire {
    #[serde(rename = "tC", deserialize_with = "available")]
    celsius: Option<f64>,
    #[serde(rename = "tF", deserialize_with = "available")]
    fahrenheit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SwitchWire {
    #[serde(deserialize_with = "available")]
    output: Option<bool>,
    #[serde(deserialize_with = "available")]
    apower: Option<f64>,
    #[serde(deserialize_with = "available")]
    pf: Option<f64>,
    #[serde(deserialize_with = "available")]
    current: Option<f64>,
    #[serde(deserialize_with = "available")]
    voltage: Option<f64>,
    #[serde(deserialize_with = "available")]
    aenergy: Option<EnergyWire>,
    #[serde(deserialize_with = "available")]
    temperature: Option<TemperatureWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoverWire {
    #[serde(deserialize_with = "available")]
    state: Option<String>,
    #[serde(deserialize_with = "available")]
    current_pos: Option<f64>,
    #[serde(deserialize_with = "available")]
    apower: Option<f64>,
    #[serde(deserialize_with = "available")]
    pf: Option<f64>,
    #[serde(deserialize_with = "available")]
    current: Option<f64>,
    #[serde(deserialize_with = "available")]
    voltage: Option<f64>,
    #[serde(deserialize_with = "available")]
    aenergy: Option<EnergyWire>,
    #[serde(deserialize_with = "available")]
    temperature: Option<TemperatureWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LightWire {
    #[serde(deserialize_with = "available")]
    output: Option<bool>,
    #[serde(deserialize_with = "available")]
    brightness: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InputWire {
    #[serde(deserialize_with = "available")]
    state: Option<bool>,
    #[serde(deserialize_with = "available")]
    percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HumidityWire {
    #[serde(deserialize_with = "available")]
    rh: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VoltmeterWire {
    #[serde(deserialize_with = "available")]
    voltage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PowerMeterWire {
    #[serde(deserialize_with = "available")]
    apower: Option<f64>,
    #[serde(deserialize_with = "available")]
    voltage: Option<f64>,
    #[serde(deserialize_with = "available")]
    current: Option<f64>,
    #[serde(deserialize_with = "available")]
    freq: Option<f64>,
    #[serde(deserialize_with = "available")]
    aenergy: Option<EnergyWire>,
}

// ── JSON-RPC frames ──────────────────────────────────────────────────

/// Outgoing request frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub id: u64,
    pub src: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Any incoming frame: a response (`id` + `result`/`error`) or a
/// notification (`method` + `params`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A status snapshot (`GetStatus` response) or delta (`NotifyStatus`).
    Status {
        status: Gen2Status,
        request_id: Option<u64>,
        full: bool,
    },
    /// A response without status content, e.g. to `Switch.Set`.
    Ack { id: u64 },
    RpcError { id: Option<u64>, error: RpcErrorBody },
    /// Notifications we do not act on (`NotifyEvent`, ...).
    Ignored,
}

impl RpcFrame {
    /// Interpret the frame. `is_status_request` tells which response ids
    /// belong to `Shelly.GetStatus` calls.
    pub fn classify(
        self,
        is_status_request: impl Fn(u64) -> bool,
    ) -> Result<InboundFrame, serde_json::Error> {
        if let Some(error) = self.error {
            return Ok(InboundFrame::RpcError { id: self.id, error });
        }

        match (self.method.as_deref(), self.id) {
            (Some(method @ ("NotifyStatus" | "NotifyFullStatus")), _) => {
                let params = self.params.unwrap_or(Value::Null);
                Ok(InboundFrame::Status {
                    status: Gen2Status::from_value(&params)?,
                    request_id: None,
                    full: method == "NotifyFullStatus",
                })
            }
            (Some(_), _) => Ok(InboundFrame::Ignored),
            (None, Some(id)) if is_status_request(id) => {
                let result = self.result.unwrap_or(Value::Null);
                Ok(InboundFrame::Status {
                    status: Gen2Status::from_value(&result)?,
                    request_id: Some(id),
                    full: true,
                })
            }
            (None, Some(id)) => Ok(InboundFrame::Ack { id }),
            (None, None) => Ok(InboundFrame::Ignored),
        }
    }
}

// ── Set commands ─────────────────────────────────────────────────────

/// RPC method and params for a single-property write.
pub fn set_command(key: &PropertyKey, value: &PropertyValue) -> Result<(&'static str, Value), Error> {
    let invalid = || Error::InvalidValue {
        property: key.to_string(),
        value: value.to_string(),
    };
    let id = key.id;

    match (key.kind, key.attribute) {
        (ComponentKind::Switch, Attribute::On) => {
            let on = value.as_bool().ok_or_else(invalid)?;
            Ok(("Switch.Set", json!({ "id": id, "on": on })))
        }
        (ComponentKind::Light, Attribute::On) => {
            let on = value.as_bool().ok_or_else(invalid)?;
            Ok(("Light.Set", json!({ "id": id, "on": on })))
        }
        (ComponentKind::Light, Attribute::Brightness) => {
            let brightness = percent(value).ok_or_else(invalid)?;
            Ok(("Light.Set", json!({ "id": id, "brightness": brightness })))
        }
        (ComponentKind::Cover, Attribute::Position) => {
            let pos = percent(value).ok_or_else(invalid)?;
            Ok(("Cover.GoToPosition", json!({ "id": id, "pos": pos })))
        }
        (ComponentKind::Cover, Attribute::State) => {
            let method = match value.as_str() {
                Some("open") => "Cover.Open",
                Some("close" | "closed") => "Cover.Close",
                Some("stop" | "stopped") => "Cover.Stop",
                _ => return Err(invalid()),
            };
            Ok((method, json!({ "id": id })))
        }
        _ => Err(Error::ReadOnlyProperty(key.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn device_info_maps_gen_field() {
        let info: Gen2DeviceInfo = serde_json::from_value(json!({
            "name": null, "id": "shellyplus1pm-a8032ab12345", "mac": "A8032AB12345",
            "model": "SNSW-001P16EU", "gen": 2, "fw_id": "20230913-114244/v1.0.3",
            "ver": "1.0.3", "app": "Plus1PM", "auth_en": true, "auth_domain": "shellyplus1pm-a8032ab12345"
        }))
        .unwrap();
        assert_eq!(info.generation, 2);
        assert!(info.auth_en);
        assert_eq!(info.name, None);
    }

    #[test]
    fn status_decodes_modelled_components_only() {
        let status = Gen2Status::from_value(&json!({
            "sys": {"mac": "A8032AB12345"},
            "switch:0": {
                "id": 0, "source": "init", "output": true, "apower": 12.3, "voltage": 229.1,
                "current": 0.05, "aenergy": {"total": 1.5, "by_minute": [0, 0, 0]},
                "temperature": {"tC": 41.2, "tF": 106.2}
            },
            "input:0": {"id": 0, "state": null}
        }))
        .unwrap();

        assert_eq!(
            status.components,
            vec![
                Component::Switch(SwitchStatus {
                    id: 0,
                    output: Some(true),
                    active_power: Some(12.3),
                    power_factor: None,
                    active_energy: Some(1.5),
                    current: Some(0.05),
                    voltage: Some(229.1),
                    celsius: Some(41.2),
                }),
                Component::Input(InputStatus {
                    id: 0,
                    state: None,
                    percent: None,
                }),
            ]
        );
    }

    #[test]
    fn unavailable_temperature_is_none() {
        let status = Gen2Status::from_value(&json!({
            "temperature:100": {"id": 100, "tC": null, "tF": null}
        }))
        .unwrap();
        assert_eq!(
            status.components,
            vec![Component::Temperature(TemperatureStatus {
                id: 100,
                celsius: None,
                fahrenheit: None,
            })]
        );
    }

    #[test]
    fn malformed_component_fails_status() {
        assert!(Gen2Status::from_value(&json!({"switch:0": {"output": "yes"}})).is_err());
        assert!(Gen2Status::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn config_lists_components_with_names() {
        let config: Gen2Config = serde_json::from_value(json!({
            "switch:1": {"id": 1, "name": "Heater"},
            "switch:0": {"id": 0, "name": null},
            "wifi": {"ap": {}}
        }))
        .unwrap();
        assert_eq!(
            config.components(),
            vec![
                (ComponentKind::Switch, 0, None),
                (ComponentKind::Switch, 1, Some("Heater".to_owned())),
            ]
        );
    }

    #[test]
    fn frames_are_classified() {
        let notify: RpcFrame = serde_json::from_value(json!({
            "src": "shellyplus1pm-a8032ab12345", "dst": "shelly-local",
            "method": "NotifyStatus", "params": {"ts": 1.0, "switch:0": {"id": 0, "apower": 5.0}}
        }))
        .unwrap();
        match notify.classify(|_| false).unwrap() {
            InboundFrame::Status { status, request_id, full } => {
                assert_eq!(request_id, None);
                assert!(!full);
                assert_eq!(status.components.len(), 1);
            }
            other => panic!("unexpected frame {other:?}"),
        }

        let response: RpcFrame = serde_json::from_value(json!({
            "id": 7, "src": "x", "result": {"switch:0": {"output": false}}
        }))
        .unwrap();
        assert!(matches!(
            response.classify(|id| id == 7).unwrap(),
            InboundFrame::Status { request_id: Some(7), full: true, .. }
        ));

        let ack: RpcFrame = serde_json::from_value(json!({"id": 8, "result": {"was_on": true}})).unwrap();
        assert_eq!(ack.classify(|id| id == 7).unwrap(), InboundFrame::Ack { id: 8 });

        let err: RpcFrame = serde_json::from_value(json!({
            "id": 9, "error": {"code": 401, "message": "unauthorized"}
        }))
        .unwrap();
        assert!(matches!(err.classify(|_| true).unwrap(), InboundFrame::RpcError { id: Some(9), .. }));
    }

    #[test]
    fn set_commands() {
        let key: PropertyKey = "switch_0_on".parse().unwrap();
        assert_eq!(
            set_command(&key, &PropertyValue::Bool(true)).unwrap(),
            ("Switch.Set", json!({"id": 0, "on": true}))
        );

        let key: PropertyKey = "cover_1_state".parse().unwrap();
        assert_eq!(
            set_command(&key, &PropertyValue::from("stop")).unwrap(),
            ("Cover.Stop", json!({"id": 1}))
        );

        let key: PropertyKey = "light_0_brightness".parse().unwrap();
        assert_eq!(
            set_command(&key, &PropertyValue::Float(55.4)).unwrap(),
            ("Light.Set", json!({"id": 0, "brightness": 55}))
        );

        let key: PropertyKey = "humidity_0_humidity".parse().unwrap();
        assert!(set_command(&key, &PropertyValue::Float(1.0)).is_err());
    }
}
