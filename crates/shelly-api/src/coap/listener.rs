// CoAP multicast listener.
//
// Owns the UDP socket bound to the CoIoT group, decodes each datagram and
// validates its payload as a Gen1 status before handing it on. Malformed
// packets are logged and dropped; the loop only exits on cancellation or
// when the receiving side goes away.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::decoder::decode_status;
use crate::error::Error;
use crate::gen1::Gen1Status;
use crate::multicast::bind_multicast;

pub const COAP_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 187);
pub const COAP_PORT: u16 = 5683;

const MAX_DATAGRAM: usize = 4096;

/// A validated status push, ready to be matched against managed devices.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapStatus {
    pub device_type: String,
    pub device_id: String,
    /// Sender address, or the relayed origin for `prxy` packets.
    pub source: IpAddr,
    pub status: Gen1Status,
}

pub struct CoapListener {
    socket: UdpSocket,
}

impl CoapListener {
    /// Bind the CoIoT multicast group on `interface` (`0.0.0.0` for any).
    pub fn bind(interface: Ipv4Addr) -> Result<Self, Error> {
        let socket = bind_multicast(COAP_MULTICAST_GROUP, COAP_PORT, interface)?;
        debug!(group = %COAP_MULTICAST_GROUP, port = COAP_PORT, "CoAP listener bound");
        Ok(Self { socket })
    }

    /// Wrap an already-bound socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the receive loop on a background task. Dropping the socket at
    /// the end of the task closes it.
    pub fn spawn(
        self,
        tx: mpsc::UnboundedSender<CoapStatus>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(listen(self.socket, tx, cancel))
    }
}

async fn listen(
    socket: UdpSocket,
    tx: mpsc::UnboundedSender<CoapStatus>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0_u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => {
                        let datagram = buf.get(..len).unwrap_or_default();
                        if let Some(status) = handle_datagram(datagram, from) {
                            if tx.send(status).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "CoAP receive failed"),
                }
            }
        }
    }

    debug!("CoAP listener stopped");
}

/// Decode and validate one datagram. Everything that is not a well-formed
/// status push yields `None`.
pub(crate) fn handle_datagram(datagram: &[u8], from: SocketAddr) -> Option<CoapStatus> {
    let packet = match decode_status(datagram) {
        Ok(Some(packet)) => packet,
        Ok(None) => {
            trace!(%from, "ignoring non-status CoAP datagram");
            return None;
        }
        Err(e) => {
            warn!(%from, error = %e, "dropping malformed CoAP datagram");
            return None;
        }
    };

    let status: Gen1Status = match serde_json::from_str(&packet.payload) {
        Ok(status) => status,
        Err(e) => {
            warn!(
                %from,
                device = %packet.device_id,
                error = %e,
                "CoAP status payload failed validation"
            );
            return None;
        }
    };

    let source = packet
        .relayed_from
        .map_or_else(|| from.ip(), IpAddr::V4);

    Some(CoapStatus {
        device_type: packet.device_type,
        device_id: packet.device_id,
        source,
        status,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coap::decoder::tests::status_datagram;

    fn sender() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 30], COAP_PORT))
    }

    #[test]
    fn valid_push_carries_identity_and_readings() {
        let datagram = status_datagram("SHSW-1#A4CF12F45A1B#2", r#"{"G":[[0,1101,1],[0,4101,12.5]]}"#);
        let status = handle_datagram(&datagram, sender()).unwrap();
        assert_eq!(status.device_type, "SHSW-1");
        assert_eq!(status.device_id, "A4CF12F45A1B");
        assert_eq!(status.source, IpAddr::from([192, 168, 1, 30]));
        assert_eq!(status.status.readings.len(), 2);
    }

    #[test]
    fn payload_failing_validation_is_dropped() {
        let datagram = status_datagram("SHSW-1#A4CF12F45A1B#2", r#"{"temperature": 3}"#);
        assert!(handle_datagram(&datagram, sender()).is_none());
    }

    #[test]
    fn malformed_packet_is_dropped() {
        assert!(handle_datagram(&[0x50, 30, 0, 1, 0xF0], sender()).is_none());
    }

    #[tokio::test]
    async fn listener_forwards_pushes_until_cancelled() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener = CoapListener::from_socket(socket);
        let addr = listener.local_addr().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = listener.spawn(tx, cancel.clone());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[0x01, 0x02], addr).await.unwrap();
        let datagram = status_datagram("SHPLG-S#C45BBE6B2A10#2", r#"{"G":[[0,1101,0]]}"#);
        client.send_to(&datagram, addr).await.unwrap();

        let status = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.device_id, "C45BBE6B2A10");
        assert_eq!(status.source, IpAddr::from([127, 0, 0, 1]));

        cancel.cancel();
        handle.await.unwrap();
    }
}
