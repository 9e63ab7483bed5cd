// shelly-api: Async Rust client for Shelly devices on the local network
// (CoAP multicast, mDNS, Gen1 REST, Gen2 RPC over HTTP and WebSocket)

pub mod auth;
pub mod coap;
pub mod component;
pub mod device;
pub mod error;
pub mod gen1;
pub mod gen2;
pub mod mdns;
pub mod property;
pub mod transport;

mod multicast;

pub use auth::Credentials;
pub use component::{Component, DeviceStatus};
pub use device::{DeviceGeneration, DeviceIdentity};
pub use error::{Error, FailureKind};
pub use gen1::Gen1Client;
pub use gen2::Gen2Client;
pub use property::{Attribute, ComponentKind, PropertyKey, PropertyValue};
pub use transport::TransportConfig;
