// mDNS discovery engine.
//
// Sends one PTR query for `_http._tcp.local`, then listens for a bounded
// window. Every response is parsed, matched against Shelly naming patterns
// and folded into a candidate; unique candidates are streamed to the caller
// as they appear.

use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::packet::{MdnsError, Message, RecordData, build_ptr_query, parse_message};
use crate::device::DeviceGeneration;
use crate::error::Error;
use crate::multicast::bind_multicast;

pub const MDNS_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;
pub const SERVICE_NAME: &str = "_http._tcp.local";
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_DATAGRAM: usize = 9000;

const HOST_PATTERN: &str = r"(?i)^shelly[a-z0-9-]*-[0-9a-f]{6,}\.local\.?$";
const SERVICE_PATTERN: &str =
    r"(?i)^(shelly[a-z0-9-]*-[0-9a-f]{6,})\._(?:http|shelly)\._tcp\.local\.?$";

// ── DiscoveryCandidate ───────────────────────────────────────────────

/// One device seen on mDNS, before any HTTP probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryCandidate {
    pub address: Ipv4Addr,
    /// Service instance name, e.g. `shellyplus1pm-a8032ab12345`.
    pub service_name: String,
    /// Host name from the SRV target, e.g. `shellyplus1pm-a8032ab12345.local`.
    pub domain: Option<String>,
    pub txt_records: BTreeMap<String, String>,
}

impl DiscoveryCandidate {
    /// Generation hinted at by the TXT records.
    pub fn generation_hint(&self) -> DeviceGeneration {
        match self.txt_records.get("gen").map(String::as_str) {
            Some("1") => return DeviceGeneration::Gen1,
            Some(g) if g.parse::<u8>().is_ok_and(|n| n >= 2) => return DeviceGeneration::Gen2,
            _ => {}
        }
        if self
            .txt_records
            .get("arch")
            .is_some_and(|arch| arch.eq_ignore_ascii_case("esp8266"))
        {
            return DeviceGeneration::Gen1;
        }
        DeviceGeneration::Unknown
    }

    /// Deterministic serialization used for de-duplication. Field order is
    /// fixed by the struct and the TXT map is ordered.
    pub fn dedup_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

// ── Name patterns ────────────────────────────────────────────────────

/// Shelly host (`<model>-<hexid>.local`) and service instance patterns.
#[derive(Debug, Clone)]
struct NamePatterns {
    host: Regex,
    service: Regex,
}

impl NamePatterns {
    fn new() -> Result<Self, Error> {
        Ok(Self {
            host: Regex::new(HOST_PATTERN)?,
            service: Regex::new(SERVICE_PATTERN)?,
        })
    }

    /// Fold one parsed response into a candidate, if it describes a Shelly.
    fn candidate(&self, message: &Message) -> Option<DiscoveryCandidate> {
        let mut address = None;
        let mut service_name = None;
        let mut domain = None;
        let mut txt_records = BTreeMap::new();

        for record in &message.records {
            match &record.data {
                RecordData::A(ip) if self.host.is_match(&record.name) => {
                    address.get_or_insert(*ip);
                }
                RecordData::Srv { target, .. } if self.service.is_match(&record.name) => {
                    domain.get_or_insert_with(|| target.trim_end_matches('.').to_ascii_lowercase());
                }
                RecordData::Ptr(data) => {
                    if let Some(instance) = self.service.captures(data).and_then(|c| c.get(1)) {
                        service_name.get_or_insert_with(|| instance.as_str().to_ascii_lowercase());
                    }
                }
                RecordData::Txt(entries) if self.service.is_match(&record.name) => {
                    for entry in entries {
                        if let Some((key, value)) = entry.split_once('=') {
                            txt_records
                                .entry(key.to_ascii_lowercase())
                                .or_insert_with(|| value.to_owned());
                        }
                    }
                }
                _ => {}
            }
        }

        // Some firmwares skip the PTR in unsolicited announcements; fall back
        // to the host name.
        let service_name = service_name.or_else(|| {
            domain
                .as_deref()
                .and_then(|d| d.strip_suffix(".local"))
                .map(str::to_owned)
        })?;

        Some(DiscoveryCandidate {
            address: address?,
            service_name,
            domain,
            txt_records,
        })
    }
}

// ── CandidateCollector ───────────────────────────────────────────────

/// Accumulates unique candidates across many datagrams.
#[derive(Debug)]
pub struct CandidateCollector {
    patterns: NamePatterns,
    seen: HashSet<String>,
    candidates: Vec<DiscoveryCandidate>,
}

impl CandidateCollector {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            patterns: NamePatterns::new()?,
            seen: HashSet::new(),
            candidates: Vec::new(),
        })
    }

    /// Parse a datagram. Returns the candidate if it has not been seen
    /// before in this collector.
    pub fn feed(&mut self, datagram: &[u8]) -> Result<Option<&DiscoveryCandidate>, MdnsError> {
        let message = parse_message(datagram)?;
        let Some(candidate) = self.patterns.candidate(&message) else {
            return Ok(None);
        };
        if !self.seen.insert(candidate.dedup_key()) {
            return Ok(None);
        }
        self.candidates.push(candidate);
        Ok(self.candidates.last())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ── MdnsDiscovery ────────────────────────────────────────────────────

/// One-shot discovery run.
#[derive(Debug, Clone)]
pub struct MdnsDiscovery {
    pub interface: Ipv4Addr,
    pub timeout: Duration,
    /// Where the query is sent. Defaults to the mDNS group.
    pub target: SocketAddr,
}

impl Default for MdnsDiscovery {
    fn default() -> Self {
        Self {
            interface: Ipv4Addr::UNSPECIFIED,
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            target: SocketAddr::V4(SocketAddrV4::new(MDNS_MULTICAST_GROUP, MDNS_PORT)),
        }
    }
}

impl MdnsDiscovery {
    pub fn new(interface: Ipv4Addr, timeout: Duration) -> Self {
        Self {
            interface,
            timeout,
            ..Self::default()
        }
    }

    /// Bind the mDNS group, query, and stream unique candidates to `tx`
    /// until the window closes or `cancel` fires. Returns the number of
    /// candidates found. The socket is closed on return.
    pub async fn run(
        &self,
        tx: mpsc::UnboundedSender<DiscoveryCandidate>,
        cancel: &CancellationToken,
    ) -> Result<usize, Error> {
        let socket = bind_multicast(MDNS_MULTICAST_GROUP, MDNS_PORT, self.interface)?;
        self.run_on(socket, tx, cancel).await
    }

    /// Same as [`run`](Self::run) on an already-bound socket.
    pub async fn run_on(
        &self,
        socket: UdpSocket,
        tx: mpsc::UnboundedSender<DiscoveryCandidate>,
        cancel: &CancellationToken,
    ) -> Result<usize, Error> {
        let query = build_ptr_query(SERVICE_NAME);
        socket.send_to(&query, self.target).await?;
        info!(timeout_secs = self.timeout.as_secs(), "mDNS query sent");

        let mut collector = CandidateCollector::new()?;
        let mut buf = vec![0_u8; MAX_DATAGRAM];
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = &mut deadline => break,
                received = socket.recv_from(&mut buf) => {
                    let (len, from) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "mDNS receive failed");
                            continue;
                        }
                    };
                    let datagram = buf.get(..len).unwrap_or_default();
                    match collector.feed(datagram) {
                        Ok(Some(candidate)) => {
                            debug!(
                                %from,
                                service = %candidate.service_name,
                                address = %candidate.address,
                                "mDNS candidate"
                            );
                            if tx.send(candidate.clone()).is_err() {
                                break;
                            }
                        }
                        Ok(None) | Err(MdnsError::NotAResponse) => {
                            trace!(%from, "ignoring mDNS datagram");
                        }
                        Err(MdnsError::TruncatedResponse) => {
                            warn!(%from, "rejecting truncated mDNS response");
                        }
                        Err(e) => warn!(%from, error = %e, "malformed mDNS response"),
                    }
                }
            }
        }

        info!(found = collector.len(), "mDNS discovery finished");
        Ok(collector.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mdns::packet::fixtures::shelly_response;

    #[test]
    fn same_response_twice_yields_one_candidate() {
        let buf = shelly_response([192, 168, 1, 50], &["gen=2", "app=Plus1PM"]);
        let mut collector = CandidateCollector::new().unwrap();
        assert!(collector.is_empty());

        let first = collector.feed(&buf).unwrap().cloned().unwrap();
        assert!(collector.feed(&buf).unwrap().is_none());
        assert_eq!(collector.len(), 1);

        assert_eq!(first.address, Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(first.service_name, "shellyplus1pm-a8032ab12345");
        assert_eq!(first.domain.as_deref(), Some("shellyplus1pm-a8032ab12345.local"));
        assert_eq!(first.txt_records.get("app").map(String::as_str), Some("Plus1PM"));
        assert_eq!(first.generation_hint(), DeviceGeneration::Gen2);
    }

    #[test]
    fn different_addresses_are_distinct_candidates() {
        let mut collector = CandidateCollector::new().unwrap();
        collector.feed(&shelly_response([10, 0, 0, 1], &[])).unwrap();
        collector.feed(&shelly_response([10, 0, 0, 2], &[])).unwrap();
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn generation_hints_from_txt() {
        let mut candidate = DiscoveryCandidate {
            address: Ipv4Addr::LOCALHOST,
            service_name: "shelly1-98f4abf2d1a3".into(),
            domain: None,
            txt_records: BTreeMap::new(),
        };
        assert_eq!(candidate.generation_hint(), DeviceGeneration::Unknown);

        candidate.txt_records.insert("arch".into(), "esp8266".into());
        assert_eq!(candidate.generation_hint(), DeviceGeneration::Gen1);

        candidate.txt_records.insert("gen".into(), "2".into());
        assert_eq!(candidate.generation_hint(), DeviceGeneration::Gen2);
    }

    #[test]
    fn non_shelly_hosts_are_ignored() {
        let message = Message {
            id: 0,
            flags: 0x8400,
            records: vec![crate::mdns::Record {
                name: "printer-abcdef.local".into(),
                ttl: 120,
                data: RecordData::A(Ipv4Addr::new(10, 0, 0, 9)),
            }],
        };
        assert!(NamePatterns::new().unwrap().candidate(&message).is_none());
    }

    #[test]
    fn dedup_key_is_stable_regardless_of_txt_order() {
        let mut a = BTreeMap::new();
        a.insert("gen".to_owned(), "2".to_owned());
        a.insert("app".to_owned(), "Plus1".to_owned());
        let mut b = BTreeMap::new();
        b.insert("app".to_owned(), "Plus1".to_owned());
        b.insert("gen".to_owned(), "2".to_owned());

        let make = |txt| DiscoveryCandidate {
            address: Ipv4Addr::LOCALHOST,
            service_name: "shellyplus1-aabbccddeeff".into(),
            domain: None,
            txt_records: txt,
        };
        assert_eq!(make(a).dedup_key(), make(b).dedup_key());
    }

    #[tokio::test]
    async fn run_streams_candidates_then_closes() {
        let engine_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let engine_addr = engine_socket.local_addr().unwrap();
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let engine = MdnsDiscovery {
            interface: Ipv4Addr::LOCALHOST,
            timeout: Duration::from_millis(500),
            target: responder.local_addr().unwrap(),
        };

        let respond = async {
            let mut buf = [0_u8; 512];
            let (_, from) = responder.recv_from(&mut buf).await.unwrap();
            assert_eq!(from, engine_addr);
            let answer = shelly_response([192, 168, 1, 50], &["gen=2"]);
            responder.send_to(&answer, from).await.unwrap();
            responder.send_to(&answer, from).await.unwrap();
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (found, ()) = tokio::join!(engine.run_on(engine_socket, tx, &cancel), respond);

        assert_eq!(found.unwrap(), 1);
        let candidate = rx.recv().await.unwrap();
        assert_eq!(candidate.address, Ipv4Addr::new(192, 168, 1, 50));
        assert!(rx.recv().await.is_none());
    }
}
