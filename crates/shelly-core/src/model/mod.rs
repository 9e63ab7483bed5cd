// ── Domain model ──
//
// What the connector knows about devices and what it tells the host.

mod description;
mod device;
mod message;
mod state;

pub use description::{ChannelDescription, DataType, DeviceDescription, PropertyDescription};
pub use device::ManagedDevice;
pub use message::{ConnectorMessage, PropertyStatus};
pub use state::ConnectionState;
