//! CoIoT (CoAP) status pushes from Gen1 devices.
//!
//! Gen1 devices multicast their readings to `224.0.1.187:5683` whenever a
//! value changes (and periodically otherwise). [`decode_status`] unpacks the
//! binary CoAP framing; [`CoapListener`] owns the socket and emits validated
//! [`CoapStatus`] values on a channel.

mod decoder;
mod listener;

pub use decoder::{CoapError, CoapStatusPacket, IDENTITY_OPTION, STATUS_CODE, decode_status};
pub use listener::{COAP_MULTICAST_GROUP, COAP_PORT, CoapListener, CoapStatus};
