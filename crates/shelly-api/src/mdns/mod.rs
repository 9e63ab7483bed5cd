//! Multicast DNS discovery of Shelly devices.
//!
//! [`packet`] is a minimal DNS wire codec (PTR query out; A, PTR, SRV and
//! TXT records in). [`discovery`] drives the query/collect window and turns
//! records into de-duplicated [`DiscoveryCandidate`]s.

pub mod discovery;
pub mod packet;

pub use discovery::{
    CandidateCollector, DEFAULT_DISCOVERY_TIMEOUT, DiscoveryCandidate, MDNS_MULTICAST_GROUP,
    MDNS_PORT, MdnsDiscovery, SERVICE_NAME,
};
pub use packet::{MdnsError, Message, Record, RecordData};
