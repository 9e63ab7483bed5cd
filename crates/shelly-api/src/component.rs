//! Typed component status, shared by both generations.
//!
//! Wire payloads are decoded into these structs exactly once. Readings the
//! device reports as unavailable (JSON `null`, `"N/A"`, or a Gen1 sensor's
//! invalid-value sentinel) become `None` here, so nothing downstream has to
//! know what "unavailable" looks like on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::gen1::Gen1Status;
use crate::gen2::Gen2Status;
use crate::property::ComponentKind;

// ── Raw status union ─────────────────────────────────────────────────

/// A decoded status payload, tagged by the generation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceStatus {
    /// CoIoT readings (`/cit/s` or a CoAP push). Needs the device's `/cit/d`
    /// description before it can be turned into components.
    Gen1(Gen1Status),
    /// Gen2 `Shelly.GetStatus` result or notification params.
    Gen2(Gen2Status),
}

// ── Component status structs ─────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwitchStatus {
    pub id: u32,
    pub output: Option<bool>,
    pub active_power: Option<f64>,
    pub power_factor: Option<f64>,
    pub active_energy: Option<f64>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub celsius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverStatus {
    pub id: u32,
    pub state: Option<String>,
    pub position: Option<f64>,
    pub active_power: Option<f64>,
    pub power_factor: Option<f64>,
    pub active_energy: Option<f64>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub celsius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightStatus {
    pub id: u32,
    pub output: Option<bool>,
    pub brightness: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputStatus {
    pub id: u32,
    pub state: Option<bool>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureStatus {
    pub id: u32,
    pub celsius: Option<f64>,
    pub fahrenheit: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HumidityStatus {
    pub id: u32,
    pub relative: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoltmeterStatus {
    pub id: u32,
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerMeterStatus {
    pub id: u32,
    pub active_power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub active_energy: Option<f64>,
}

/// Status of one device sub-component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    Switch(SwitchStatus),
    Cover(CoverStatus),
    Light(LightStatus),
    Input(InputStatus),
    Temperature(TemperatureStatus),
    Humidity(HumidityStatus),
    Voltmeter(VoltmeterStatus),
    #[serde(rename = "pm1")]
    PowerMeter(PowerMeterStatus),
}

impl Component {
    /// An empty component of `kind` with every reading unavailable.
    pub fn empty(kind: ComponentKind, id: u32) -> Self {
        match kind {
            ComponentKind::Switch => Self::Switch(SwitchStatus {
                id,
                ..SwitchStatus::default()
            }),
            ComponentKind::Cover => Self::Cover(CoverStatus {
                id,
                ..CoverStatus::default()
            }),
            ComponentKind::Light => Self::Light(LightStatus {
                id,
                ..LightStatus::default()
            }),
            ComponentKind::Input => Self::Input(InputStatus {
                id,
                ..InputStatus::default()
            }),
            ComponentKind::Temperature => Self::Temperature(TemperatureStatus {
                id,
                ..TemperatureStatus::default()
            }),
            ComponentKind::Humidity => Self::Humidity(HumidityStatus {
                id,
                ..HumidityStatus::default()
            }),
            ComponentKind::Voltmeter => Self::Voltmeter(VoltmeterStatus {
                id,
                ..VoltmeterStatus::default()
            }),
            ComponentKind::PowerMeter => Self::PowerMeter(PowerMeterStatus {
                id,
                ..PowerMeterStatus::default()
            }),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Switch(_) => ComponentKind::Switch,
            Self::Cover(_) => ComponentKind::Cover,
            Self::Light(_) => ComponentKind::Light,
            Self::Input(_) => ComponentKind::Input,
            Self::Temperature(_) => ComponentKind::Temperature,
            Self::Humidity(_) => ComponentKind::Humidity,
            Self::Voltmeter(_) => ComponentKind::Voltmeter,
            Self::PowerMeter(_) => ComponentKind::PowerMeter,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Switch(s) => s.id,
            Self::Cover(s) => s.id,
            Self::Light(s) => s.id,
            Self::Input(s) => s.id,
            Self::Temperature(s) => s.id,
            Self::Humidity(s) => s.id,
            Self::Voltmeter(s) => s.id,
            Self::PowerMeter(s) => s.id,
        }
    }
}

// ── Availability helpers ─────────────────────────────────────────────

/// Returns `true` for the values devices use to say "no reading".
pub fn is_unavailable(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.eq_ignore_ascii_case("n/a"),
        _ => false,
    }
}

/// Serde helper: deserialize an optional reading, mapping the
/// "not available" markers to `None`.
///
/// Use together with `#[serde(default)]` so absent fields also become `None`.
pub(crate) fn available<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if is_unavailable(&value) {
        return Ok(None);
    }
    T::deserialize(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}
