//! Status normalization.
//!
//! Turns typed component status from either generation into ordered
//! [`PropertyStatus`] entries. Pure functions: no I/O, no state.
//!
//! Readings the device reported as unavailable were already decoded to
//! `None` by `shelly-api`, so the rule here is simply "emit what is
//! present, in the attribute order of the component kind".

use shelly_api::component::{
    CoverStatus, HumidityStatus, InputStatus, LightStatus, PowerMeterStatus, SwitchStatus,
    TemperatureStatus, VoltmeterStatus,
};
use shelly_api::gen1::{Gen1Description, Gen1Status};
use shelly_api::gen2::Gen2Status;
use shelly_api::{Attribute, Component, DeviceStatus, PropertyKey, PropertyValue};

use crate::model::PropertyStatus;

/// Normalize a raw status payload.
///
/// Gen1 readings are meaningless without the device's `/cit/d` description;
/// without one nothing is emitted.
pub fn normalize_status(
    status: &DeviceStatus,
    description: Option<&Gen1Description>,
) -> Vec<PropertyStatus> {
    match status {
        DeviceStatus::Gen1(status) => {
            description.map_or_else(Vec::new, |desc| normalize_gen1(status, desc))
        }
        DeviceStatus::Gen2(status) => normalize_gen2(status),
    }
}

fn normalize_gen1(status: &Gen1Status, description: &Gen1Description) -> Vec<PropertyStatus> {
    normalize_components(&status.components(description))
}

fn normalize_gen2(status: &Gen2Status) -> Vec<PropertyStatus> {
    normalize_components(&status.components)
}

pub fn normalize_components(components: &[Component]) -> Vec<PropertyStatus> {
    components.iter().flat_map(normalize_component).collect()
}

/// Normalize one component, in the emission order of its kind.
pub fn normalize_component(component: &Component) -> Vec<PropertyStatus> {
    let mut out = Emitter::new(component);
    match component {
        Component::Switch(s) => switch(&mut out, s),
        Component::Cover(s) => cover(&mut out, s),
        Component::Light(s) => light(&mut out, s),
        Component::Input(s) => input(&mut out, s),
        Component::Temperature(s) => temperature(&mut out, s),
        Component::Humidity(s) => humidity(&mut out, s),
        Component::Voltmeter(s) => voltmeter(&mut out, s),
        Component::PowerMeter(s) => power_meter(&mut out, s),
    }
    out.statuses
}

// ── Per-kind mappings ────────────────────────────────────────────────

fn switch(out: &mut Emitter, s: &SwitchStatus) {
    out.push(Attribute::On, s.output);
    out.push(Attribute::ActivePower, s.active_power);
    out.push(Attribute::PowerFactor, s.power_factor);
    out.push(Attribute::ActiveEnergy, s.active_energy);
    out.push(Attribute::Current, s.current);
    out.push(Attribute::Voltage, s.voltage);
    out.push(Attribute::Celsius, s.celsius);
}

fn cover(out: &mut Emitter, s: &CoverStatus) {
    out.push(Attribute::State, s.state.clone());
    out.push(Attribute::Position, s.position.map(whole));
    out.push(Attribute::ActivePower, s.active_power);
    out.push(Attribute::PowerFactor, s.power_factor);
    out.push(Attribute::ActiveEnergy, s.active_energy);
    out.push(Attribute::Current, s.current);
    out.push(Attribute::Voltage, s.voltage);
    out.push(Attribute::Celsius, s.celsius);
}

fn light(out: &mut Emitter, s: &LightStatus) {
    out.push(Attribute::On, s.output);
    out.push(Attribute::Brightness, s.brightness.map(whole));
}

fn input(out: &mut Emitter, s: &InputStatus) {
    out.push(Attribute::State, s.state);
    out.push(Attribute::Percent, s.percent);
}

fn temperature(out: &mut Emitter, s: &TemperatureStatus) {
    out.push(Attribute::Celsius, s.celsius);
    out.push(Attribute::Fahrenheit, s.fahrenheit);
}

fn humidity(out: &mut Emitter, s: &HumidityStatus) {
    out.push(Attribute::Humidity, s.relative);
}

fn voltmeter(out: &mut Emitter, s: &VoltmeterStatus) {
    out.push(Attribute::Voltage, s.voltage);
}

fn power_meter(out: &mut Emitter, s: &PowerMeterStatus) {
    out.push(Attribute::ActivePower, s.active_power);
    out.push(Attribute::Voltage, s.voltage);
    out.push(Attribute::Current, s.current);
    out.push(Attribute::Frequency, s.frequency);
    out.push(Attribute::ActiveEnergy, s.active_energy);
}

// ── Helpers ──────────────────────────────────────────────────────────

struct Emitter {
    component: (shelly_api::ComponentKind, u32),
    statuses: Vec<PropertyStatus>,
}

impl Emitter {
    fn new(component: &Component) -> Self {
        Self {
            component: (component.kind(), component.id()),
            statuses: Vec::new(),
        }
    }

    fn push<V: Into<PropertyValue>>(&mut self, attribute: Attribute, value: Option<V>) {
        if let Some(value) = value {
            let (kind, id) = self.component;
            self.statuses
                .push(PropertyStatus::new(PropertyKey::new(kind, id, attribute), value));
        }
    }
}

/// Percentages (position, brightness) are whole numbers on the wire but
/// arrive as JSON numbers of either flavour.
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
fn whole(value: f64) -> PropertyValue {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        PropertyValue::Integer(value as i64)
    } else {
        PropertyValue::Float(value)
    }
}
