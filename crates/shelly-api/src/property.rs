//! Property identifiers and scalar values.
//!
//! Every reading a device produces is addressed by a [`PropertyKey`] of the
//! form `<component>_<id>_<attribute>` (for example `switch_0_active_power`)
//! and belongs to the channel `<component>:<id>`. Both generations share the
//! scheme, so downstream code never cares which protocol produced a value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;

// ── ComponentKind ────────────────────────────────────────────────────

/// Kind of device sub-component. The string form matches the Gen2
/// component key prefix (`switch:0`, `pm1:0`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    Switch,
    Cover,
    Light,
    Input,
    Temperature,
    Humidity,
    Voltmeter,
    #[serde(rename = "pm1")]
    #[strum(serialize = "pm1")]
    PowerMeter,
}

impl ComponentKind {
    /// Attributes this kind reports, in emission order.
    pub fn attributes(self) -> &'static [Attribute] {
        use Attribute as A;
        match self {
            Self::Switch => &[
                A::On,
                A::ActivePower,
                A::PowerFactor,
                A::ActiveEnergy,
                A::Current,
                A::Voltage,
                A::Celsius,
            ],
            Self::Cover => &[
                A::State,
                A::Position,
                A::ActivePower,
                A::PowerFactor,
                A::ActiveEnergy,
                A::Current,
                A::Voltage,
                A::Celsius,
            ],
            Self::Light => &[A::On, A::Brightness],
            Self::Input => &[A::State, A::Percent],
            Self::Temperature => &[A::Celsius, A::Fahrenheit],
            Self::Humidity => &[A::Humidity],
            Self::Voltmeter => &[A::Voltage],
            Self::PowerMeter => &[
                A::ActivePower,
                A::Voltage,
                A::Current,
                A::Frequency,
                A::ActiveEnergy,
            ],
        }
    }

    /// Whether `attribute` can be written on this kind of component.
    pub fn is_settable(self, attribute: Attribute) -> bool {
        matches!(
            (self, attribute),
            (Self::Switch | Self::Light, Attribute::On)
                | (Self::Cover, Attribute::State | Attribute::Position)
                | (Self::Light, Attribute::Brightness)
        )
    }
}

// ── Attribute ────────────────────────────────────────────────────────

/// A single measurable or controllable attribute of a component.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
    On,
    State,
    Position,
    Brightness,
    ActivePower,
    PowerFactor,
    ActiveEnergy,
    Current,
    Voltage,
    Frequency,
    Celsius,
    Fahrenheit,
    Humidity,
    Percent,
}

// ── PropertyKey ──────────────────────────────────────────────────────

/// Fully qualified property identifier: component kind, component index
/// and attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    pub kind: ComponentKind,
    pub id: u32,
    pub attribute: Attribute,
}

impl PropertyKey {
    pub fn new(kind: ComponentKind, id: u32, attribute: Attribute) -> Self {
        Self {
            kind,
            id,
            attribute,
        }
    }

    /// Channel identifier this property belongs to, e.g. `switch:0`.
    pub fn channel(&self) -> String {
        channel_identifier(self.kind, self.id)
    }

    pub fn is_settable(&self) -> bool {
        self.kind.is_settable(self.attribute)
    }
}

/// Build a channel identifier, e.g. `cover:1`.
pub fn channel_identifier(kind: ComponentKind, id: u32) -> String {
    format!("{kind}:{id}")
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind, self.id, self.attribute)
    }
}

impl FromStr for PropertyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidProperty(s.to_owned());

        // Component kinds never contain '_', attributes may.
        let mut parts = s.splitn(3, '_');
        let kind = parts
            .next()
            .and_then(|k| k.parse::<ComponentKind>().ok())
            .ok_or_else(invalid)?;
        let id = parts
            .next()
            .and_then(|i| i.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let attribute = parts
            .next()
            .and_then(|a| a.parse::<Attribute>().ok())
            .ok_or_else(invalid)?;

        if !kind.attributes().contains(&attribute) {
            return Err(invalid());
        }

        Ok(Self::new(kind, id, attribute))
    }
}

impl Serialize for PropertyKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PropertyKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── PropertyValue ────────────────────────────────────────────────────

/// Scalar property value. Nulls are never represented: an unavailable
/// reading is simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    /// Interpret user input: booleans (`true`/`false`/`on`/`off`), then
    /// integers, then floats, otherwise text.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "on" => return Self::Bool(true),
            "false" | "off" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(raw.to_owned())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::Text(s) => match s.as_str() {
                "on" | "true" => Some(true),
                "off" | "false" => Some(false),
                _ => None,
            },
            Self::Float(_) => None,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips_through_display() {
        let key = PropertyKey::new(ComponentKind::Switch, 0, Attribute::ActivePower);
        assert_eq!(key.to_string(), "switch_0_active_power");
        assert_eq!("switch_0_active_power".parse::<PropertyKey>().ok(), Some(key));
        assert_eq!(key.channel(), "switch:0");
    }

    #[test]
    fn power_meter_uses_pm1_prefix() {
        let key: PropertyKey = "pm1_0_frequency".parse().unwrap();
        assert_eq!(key.kind, ComponentKind::PowerMeter);
        assert_eq!(key.channel(), "pm1:0");
    }

    #[test]
    fn rejects_attribute_foreign_to_kind() {
        assert!("humidity_0_on".parse::<PropertyKey>().is_err());
        assert!("switch_x_on".parse::<PropertyKey>().is_err());
        assert!("switch".parse::<PropertyKey>().is_err());
    }

    #[test]
    fn settable_attributes() {
        assert!(PropertyKey::new(ComponentKind::Cover, 0, Attribute::Position).is_settable());
        assert!(!PropertyKey::new(ComponentKind::Switch, 0, Attribute::ActivePower).is_settable());
    }

    #[test]
    fn value_parsing_prefers_bool_then_number() {
        assert_eq!(PropertyValue::parse("on"), PropertyValue::Bool(true));
        assert_eq!(PropertyValue::parse("42"), PropertyValue::Integer(42));
        assert_eq!(PropertyValue::parse("4.5"), PropertyValue::Float(4.5));
        assert_eq!(PropertyValue::parse("open"), PropertyValue::Text("open".into()));
    }

    #[test]
    fn values_serialize_as_bare_scalars() {
        let json = serde_json::to_string(&PropertyValue::Float(12.3)).unwrap();
        assert_eq!(json, "12.3");
        let json = serde_json::to_string(&PropertyValue::Bool(true)).unwrap();
        assert_eq!(json, "true");
    }
}
