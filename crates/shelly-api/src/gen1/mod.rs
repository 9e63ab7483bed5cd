//! Gen1 REST API.
//!
//! Gen1 devices describe their readings once (`/cit/d`: blocks and sensors)
//! and then publish bare `[block, sensor, value]` triples, over CoAP or via
//! `/cit/s`. The description is needed to interpret the triples, so callers
//! cache it per device.

mod client;
mod models;

pub use client::Gen1Client;
pub(crate) use models::percent;
pub use models::{
    Block, Gen1Description, Gen1DeviceInfo, Gen1Status, ResolvedSensor, Sensor, SensorReading,
    set_request,
};
