// shelly-core: Device sessions, discovery and status normalization on top of shelly-api.

pub mod config;
pub mod connector;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod model;
pub mod normalize;
pub mod oneshot;
pub mod repository;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ConnectorConfig;
pub use connector::Connector;
pub use discovery::DiscoveryPipeline;
pub use error::CoreError;
pub use repository::{DeviceRepository, InMemoryDeviceRepository};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ChannelDescription, ConnectionState, ConnectorMessage, DataType, DeviceDescription,
    ManagedDevice, PropertyDescription, PropertyStatus,
};

// Wire-level types consumers need alongside the model.
pub use shelly_api::auth::DEFAULT_USERNAME;
pub use shelly_api::{
    Credentials, DeviceGeneration, DeviceIdentity, FailureKind, PropertyKey, PropertyValue,
};
