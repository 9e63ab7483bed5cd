// ── Runtime connector configuration ──
//
// Tuning for discovery and the connector loop. Never touches disk: the
// CLI (through shelly-config) builds a `ConnectorConfig` and hands it in.

use std::net::Ipv4Addr;
use std::time::Duration;

use shelly_api::TransportConfig;
use shelly_api::gen2::ReconnectPolicy;

/// Connector tuning knobs. Defaults suit a typical home LAN.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    /// Scheduler tick. One device is considered per tick.
    pub poll_tick: Duration,
    /// Minimum interval between status reads of one device, unless the
    /// device overrides it.
    pub status_reading_delay: Duration,
    /// Minimum interval between WebSocket connection attempts.
    pub reconnect_cool_down: Duration,
    /// HTTP request timeout, also the deadline for in-flight reads.
    pub request_timeout: Duration,
    /// Wall-clock bound of a discovery run. The mDNS window closes one
    /// request timeout earlier.
    pub discovery_timeout: Duration,
    /// Listen for Gen1 CoAP status pushes.
    pub coap_enabled: bool,
    /// Local interface for multicast sockets.
    pub bind_address: Ipv4Addr,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            poll_tick: Duration::from_millis(10),
            status_reading_delay: Duration::from_secs(15),
            reconnect_cool_down: Duration::from_secs(300),
            request_timeout: shelly_api::transport::DEFAULT_REQUEST_TIMEOUT,
            discovery_timeout: shelly_api::mdns::DEFAULT_DISCOVERY_TIMEOUT,
            coap_enabled: true,
            bind_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl ConnectorConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default().with_timeout(self.request_timeout)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            cool_down: self.reconnect_cool_down,
        }
    }
}
