// Gen1 CoIoT description, status, and device info payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{Component, is_unavailable};
use crate::error::Error;
use crate::property::{Attribute, ComponentKind, PropertyKey, PropertyValue};

// ── /shelly ──────────────────────────────────────────────────────────

/// Response of `GET /shelly`. Always readable, even with auth enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen1DeviceInfo {
    #[serde(rename = "type")]
    pub model: String,
    pub mac: String,
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub fw: String,
    #[serde(default)]
    pub num_outputs: Option<u32>,
}

// ── /cit/d ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gen1Description {
    #[serde(rename = "blk")]
    pub blocks: Vec<Block>,
    #[serde(rename = "sen")]
    pub sensors: Vec<Sensor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "I")]
    pub id: u32,
    #[serde(rename = "D")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    #[serde(rename = "I")]
    pub id: u32,
    #[serde(rename = "T")]
    pub sensor_type: String,
    #[serde(rename = "D")]
    pub description: String,
    #[serde(rename = "U", default)]
    pub unit: Option<String>,
    /// Range: either `"min/max"` or `["min/max", "<invalid sentinel>"]`.
    #[serde(rename = "R", default)]
    pub range: Option<Value>,
    /// Linked block id(s): a single number or an array.
    #[serde(rename = "L")]
    pub links: Value,
}

impl Sensor {
    /// The value this sensor reports when no reading is available.
    pub fn invalid_value(&self) -> Option<&Value> {
        match self.range.as_ref()? {
            Value::Array(parts) => parts.get(1).filter(|v| !matches!(v, Value::String(s) if s.is_empty())),
            _ => None,
        }
    }

    /// Whether `value` is this sensor's sentinel. Sentinels are listed as
    /// strings (`"999"`) while readings arrive as numbers (`999`), so compare
    /// textually.
    pub fn is_invalid(&self, value: &Value) -> bool {
        if is_unavailable(value) {
            return true;
        }
        self.invalid_value().is_some_and(|sentinel| {
            sentinel == value || text_of(sentinel) == text_of(value)
        })
    }

    /// Block ids this sensor is linked to.
    pub fn block_ids(&self) -> Vec<u32> {
        match &self.links {
            Value::Array(ids) => ids.iter().filter_map(json_u32).collect(),
            single => json_u32(single).into_iter().collect(),
        }
    }
}

fn json_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string()),
        other => other.to_string(),
    }
}

/// A sensor resolved onto the shared property scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSensor<'a> {
    pub key: PropertyKey,
    pub sensor: &'a Sensor,
}

impl Gen1Description {
    pub fn sensor(&self, id: u32) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == id)
    }

    pub fn block(&self, id: u32) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Map a sensor onto a property key, via the block it is linked to.
    pub fn resolve(&self, sensor_id: u32) -> Option<ResolvedSensor<'_>> {
        let sensor = self.sensor(sensor_id)?;
        let key = sensor
            .block_ids()
            .into_iter()
            .filter_map(|block_id| self.block(block_id))
            .find_map(|block| classify(block, sensor))?;
        Some(ResolvedSensor { key, sensor })
    }

    /// Every sensor that maps onto a known property, in description order.
    pub fn properties(&self) -> Vec<ResolvedSensor<'_>> {
        self.sensors
            .iter()
            .filter_map(|s| self.resolve(s.id))
            .collect()
    }
}

/// Block description (`relay_0`, `roller_1`, `sensor_0`, ...) plus sensor
/// description to property key.
fn classify(block: &Block, sensor: &Sensor) -> Option<PropertyKey> {
    let (prefix, index) = block.description.rsplit_once('_')?;
    let index: u32 = index.parse().ok()?;
    let unit = sensor.unit.as_deref().unwrap_or_default();
    let desc = sensor.description.as_str();

    let (kind, attribute) = match (prefix, desc) {
        ("relay", "output") => (ComponentKind::Switch, Attribute::On),
        ("relay", "power") => (ComponentKind::Switch, Attribute::ActivePower),
        ("relay", "energy") => (ComponentKind::Switch, Attribute::ActiveEnergy),
        ("relay", "voltage") => (ComponentKind::Switch, Attribute::Voltage),
        ("relay", "current") => (ComponentKind::Switch, Attribute::Current),
        ("relay", "powerFactor") => (ComponentKind::Switch, Attribute::PowerFactor),
        ("roller", "roller") => (ComponentKind::Cover, Attribute::State),
        ("roller", "rollerPos") => (ComponentKind::Cover, Attribute::Position),
        ("roller", "rollerPower") => (ComponentKind::Cover, Attribute::ActivePower),
        ("roller", "rollerEnergy") => (ComponentKind::Cover, Attribute::ActiveEnergy),
        ("light", "output") => (ComponentKind::Light, Attribute::On),
        ("light", "brightness" | "gain") => (ComponentKind::Light, Attribute::Brightness),
        ("relay" | "roller" | "input", "input") => (ComponentKind::Input, Attribute::State),
        ("sensor", "extTemp" | "temp") if unit.eq_ignore_ascii_case("F") => {
            (ComponentKind::Temperature, Attribute::Fahrenheit)
        }
        ("sensor", "extTemp" | "temp") => (ComponentKind::Temperature, Attribute::Celsius),
        ("sensor", "humidity") => (ComponentKind::Humidity, Attribute::Humidity),
        ("sensor", "voltage" | "adc") => (ComponentKind::Voltmeter, Attribute::Voltage),
        ("emeter", "power") => (ComponentKind::PowerMeter, Attribute::ActivePower),
        ("emeter", "voltage") => (ComponentKind::PowerMeter, Attribute::Voltage),
        ("emeter", "current") => (ComponentKind::PowerMeter, Attribute::Current),
        ("emeter", "energy") => (ComponentKind::PowerMeter, Attribute::ActiveEnergy),
        _ => return None,
    };
    Some(PropertyKey::new(kind, index, attribute))
}

// ── /cit/s and CoAP payload ──────────────────────────────────────────

/// Bare readings: `{"G": [[channel, sensor, value], ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gen1Status {
    #[serde(rename = "G")]
    pub readings: Vec<SensorReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u32, u32, Value)", into = "(u32, u32, Value)")]
pub struct SensorReading {
    pub channel: u32,
    pub sensor: u32,
    pub value: Value,
}

impl From<(u32, u32, Value)> for SensorReading {
    fn from((channel, sensor, value): (u32, u32, Value)) -> Self {
        Self {
            channel,
            sensor,
            value,
        }
    }
}

impl From<SensorReading> for (u32, u32, Value) {
    fn from(r: SensorReading) -> Self {
        (r.channel, r.sensor, r.value)
    }
}

impl Gen1Status {
    /// Interpret the readings against `description`.
    ///
    /// Unknown sensors are skipped; sentinel readings stay `None` on the
    /// resulting component. Components come out ordered by kind and id.
    pub fn components(&self, description: &Gen1Description) -> Vec<Component> {
        let mut components: BTreeMap<(ComponentKind, u32), Component> = BTreeMap::new();

        for reading in &self.readings {
            let Some(resolved) = description.resolve(reading.sensor) else {
                continue;
            };
            let key = resolved.key;
            let component = components
                .entry((key.kind, key.id))
                .or_insert_with(|| Component::empty(key.kind, key.id));

            if resolved.sensor.is_invalid(&reading.value) {
                continue;
            }
            apply(component, key.attribute, resolved.sensor, &reading.value);
        }

        components.into_values().collect()
    }
}

/// Write one reading into the matching field of `component`.
fn apply(component: &mut Component, attribute: Attribute, sensor: &Sensor, value: &Value) {
    let number = value.as_f64();
    let flag = as_flag(value);

    match (component, attribute) {
        (Component::Switch(s), Attribute::On) => s.output = flag,
        (Component::Switch(s), Attribute::ActivePower) => s.active_power = number,
        (Component::Switch(s), Attribute::ActiveEnergy) => s.active_energy = energy_wh(sensor, number),
        (Component::Switch(s), Attribute::Voltage) => s.voltage = number,
        (Component::Switch(s), Attribute::Current) => s.current = number,
        (Component::Switch(s), Attribute::PowerFactor) => s.power_factor = number,
        (Component::Cover(c), Attribute::State) => c.state = value.as_str().map(str::to_owned),
        (Component::Cover(c), Attribute::Position) => c.position = number,
        (Component::Cover(c), Attribute::ActivePower) => c.active_power = number,
        (Component::Cover(c), Attribute::ActiveEnergy) => c.active_energy = energy_wh(sensor, number),
        (Component::Light(l), Attribute::On) => l.output = flag,
        (Component::Light(l), Attribute::Brightness) => l.brightness = number,
        (Component::Input(i), Attribute::State) => i.state = flag,
        (Component::Temperature(t), Attribute::Celsius) => t.celsius = number,
        (Component::Temperature(t), Attribute::Fahrenheit) => t.fahrenheit = number,
        (Component::Humidity(h), Attribute::Humidity) => h.relative = number,
        (Component::Voltmeter(v), Attribute::Voltage) => v.voltage = number,
        (Component::PowerMeter(p), Attribute::ActivePower) => p.active_power = number,
        (Component::PowerMeter(p), Attribute::Voltage) => p.voltage = number,
        (Component::PowerMeter(p), Attribute::Current) => p.current = number,
        (Component::PowerMeter(p), Attribute::ActiveEnergy) => p.active_energy = energy_wh(sensor, number),
        _ => {}
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Gen1 reports energy in watt-minutes; normalize to watt-hours.
fn energy_wh(sensor: &Sensor, number: Option<f64>) -> Option<f64> {
    let value = number?;
    match sensor.unit.as_deref() {
        Some("Wmin") => Some(value / 60.0),
        _ => Some(value),
    }
}

// ── Set commands ─────────────────────────────────────────────────────

/// REST path and query pairs for a single-property write.
pub fn set_request(
    key: &PropertyKey,
    value: &PropertyValue,
) -> Result<(String, Vec<(&'static str, String)>), Error> {
    let invalid = || Error::InvalidValue {
        property: key.to_string(),
        value: value.to_string(),
    };
    let on_off = |on: bool| if on { "on" } else { "off" }.to_owned();

    match (key.kind, key.attribute) {
        (ComponentKind::Switch, Attribute::On) => {
            let on = value.as_bool().ok_or_else(invalid)?;
            Ok((format!("/relay/{}", key.id), vec![("turn", on_off(on))]))
        }
        (ComponentKind::Light, Attribute::On) => {
            let on = value.as_bool().ok_or_else(invalid)?;
            Ok((format!("/light/{}", key.id), vec![("turn", on_off(on))]))
        }
        (ComponentKind::Light, Attribute::Brightness) => {
            let level = percent(value).ok_or_else(invalid)?;
            Ok((format!("/light/{}", key.id), vec![("brightness", level.to_string())]))
        }
        (ComponentKind::Cover, Attribute::Position) => {
            let pos = percent(value).ok_or_else(invalid)?;
            Ok((
                format!("/roller/{}", key.id),
                vec![("go", "to_pos".to_owned()), ("roller_pos", pos.to_string())],
            ))
        }
        (ComponentKind::Cover, Attribute::State) => {
            let go = match value.as_str() {
                Some("open") => "open",
                Some("close" | "closed") => "close",
                Some("stop" | "stopped") => "stop",
                _ => return Err(invalid()),
            };
            Ok((format!("/roller/{}", key.id), vec![("go", go.to_owned())]))
        }
        _ => Err(Error::ReadOnlyProperty(key.to_string())),
    }
}

/// Clamp a value to an integer percentage.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub(crate) fn percent(value: &PropertyValue) -> Option<u8> {
    let f = value.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    Some(f.round().clamp(0.0, 100.0) as u8)
}
