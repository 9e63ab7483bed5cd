//! Discovery pipeline.
//!
//! mDNS candidates are probed as they arrive: Gen2 `Shelly.GetDeviceInfo`
//! first, then Gen1 `/shelly`, unless the TXT records already named the
//! generation. Each identified device is described (identity plus channel
//! schema) and emitted as [`ConnectorMessage::DeviceFound`]. A run always
//! ends with [`ConnectorMessage::DiscoveryFinished`].

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shelly_api::mdns::{DiscoveryCandidate, MdnsDiscovery};
use shelly_api::{Credentials, DeviceGeneration, Gen1Client, Gen2Client};

use crate::config::ConnectorConfig;
use crate::convert::{gen1_channels, gen2_channels};
use crate::error::CoreError;
use crate::model::{ConnectorMessage, DeviceDescription};

pub struct DiscoveryPipeline {
    gen1: Gen1Client,
    gen2: Gen2Client,
    engine: MdnsDiscovery,
    /// Wall-clock bound of a whole run, probes included.
    deadline: Duration,
    credentials: Option<Credentials>,
}

impl DiscoveryPipeline {
    /// `credentials` are tried against every probed device.
    pub fn new(config: &ConnectorConfig, credentials: Option<Credentials>) -> Result<Self, CoreError> {
        let transport = config.transport();
        let deadline = config.discovery_timeout;
        Ok(Self {
            gen1: Gen1Client::new(&transport)?,
            gen2: Gen2Client::new(&transport)?,
            engine: MdnsDiscovery::new(config.bind_address, collection_window(config)),
            deadline,
            credentials,
        })
    }

    /// Run one discovery cycle on the mDNS multicast group.
    pub async fn run(
        &self,
        messages: &mpsc::UnboundedSender<ConnectorMessage>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceDescription>, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.drive(self.engine.run(tx, cancel), rx, messages, cancel)
            .await
    }

    /// Same as [`run`](Self::run) on an already-bound socket.
    pub async fn run_on(
        &self,
        socket: UdpSocket,
        messages: &mpsc::UnboundedSender<ConnectorMessage>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceDescription>, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.drive(self.engine.run_on(socket, tx, cancel), rx, messages, cancel)
            .await
    }

    async fn drive<F>(
        &self,
        engine: F,
        mut candidates: mpsc::UnboundedReceiver<DiscoveryCandidate>,
        messages: &mpsc::UnboundedSender<ConnectorMessage>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceDescription>, CoreError>
    where
        F: Future<Output = Result<usize, shelly_api::Error>>,
    {
        tokio::pin!(engine);
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let mut probes = FuturesUnordered::new();
        let mut engine_done = false;
        let mut candidates_closed = false;
        let mut found = Vec::new();

        while !(engine_done && candidates_closed && probes.is_empty()) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = &mut deadline => {
                    warn!(outstanding = probes.len(), "discovery deadline reached");
                    break;
                }
                result = &mut engine, if !engine_done => {
                    engine_done = true;
                    let unique = result?;
                    debug!(unique, "mDNS window closed");
                }
                candidate = candidates.recv(), if !candidates_closed => match candidate {
                    Some(candidate) => probes.push(self.probe(candidate)),
                    None => candidates_closed = true,
                },
                Some(outcome) = probes.next(), if !probes.is_empty() => {
                    if let Some(description) = outcome {
                        info!(
                            device = %description.identity.id,
                            model = %description.identity.model,
                            address = %description.identity.ip_address,
                            "device found"
                        );
                        emit(messages, ConnectorMessage::device_found(description.clone()));
                        found.push(description);
                    }
                }
            }
        }

        emit(messages, ConnectorMessage::discovery_finished(found.len()));
        Ok(found)
    }

    async fn probe(&self, candidate: DiscoveryCandidate) -> Option<DeviceDescription> {
        let address = candidate.address.to_string();
        match self
            .describe(&address, candidate.generation_hint(), candidate.domain.clone())
            .await
        {
            Ok(description) => Some(description),
            Err(e) => {
                warn!(
                    %address,
                    service = %candidate.service_name,
                    error = %e,
                    "could not identify discovered device"
                );
                None
            }
        }
    }

    /// Identify and describe the device at `address`.
    ///
    /// A password-protected device is still described: its identity comes
    /// from the open info endpoint and it has no channels.
    pub async fn describe(
        &self,
        address: &str,
        hint: DeviceGeneration,
        domain: Option<String>,
    ) -> Result<DeviceDescription, CoreError> {
        let mut description = match hint {
            DeviceGeneration::Gen1 => self.describe_gen1(address).await?,
            DeviceGeneration::Gen2 => self.describe_gen2(address).await?,
            DeviceGeneration::Unknown => match self.describe_gen2(address).await {
                Ok(description) => description,
                Err(e) => {
                    debug!(%address, error = %e, "Gen2 probe failed, trying Gen1");
                    self.describe_gen1(address).await?
                }
            },
        };
        if domain.is_some() {
            description.identity.domain = domain;
        }
        Ok(description)
    }

    async fn describe_gen2(&self, address: &str) -> Result<DeviceDescription, shelly_api::Error> {
        let identity = self.gen2.get_device_information(address).await?;
        let credentials = self.credentials.as_ref();

        let config = match self.gen2.get_device_configuration(address, credentials).await {
            Ok(config) => config,
            Err(e) if e.is_unauthorized() => {
                warn!(device = %identity.id, %address, "device is password protected");
                return Ok(DeviceDescription {
                    identity,
                    channels: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let status = match self.gen2.get_device_status(address, credentials).await {
            Ok(status) => Some(status),
            Err(e) => {
                debug!(device = %identity.id, error = %e, "status unavailable, describing from config only");
                None
            }
        };

        Ok(DeviceDescription {
            channels: gen2_channels(&config, status.as_ref()),
            identity,
        })
    }

    async fn describe_gen1(&self, address: &str) -> Result<DeviceDescription, shelly_api::Error> {
        let identity = self.gen1.get_device_information(address).await?;

        match self
            .gen1
            .get_device_description(address, self.credentials.as_ref())
            .await
        {
            Ok(description) => Ok(DeviceDescription {
                channels: gen1_channels(&description),
                identity,
            }),
            Err(e) if e.is_unauthorized() => {
                warn!(device = %identity.id, %address, "device is password protected");
                Ok(DeviceDescription {
                    identity,
                    channels: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// The mDNS window closes one request timeout before the run deadline, so
/// candidates seen late can still be probed. The grace never exceeds half
/// the run.
fn collection_window(config: &ConnectorConfig) -> Duration {
    let grace = config.request_timeout.min(config.discovery_timeout / 2);
    config.discovery_timeout.saturating_sub(grace)
}

fn emit(messages: &mpsc::UnboundedSender<ConnectorMessage>, message: ConnectorMessage) {
    if messages.send(message).is_err() {
        debug!("message receiver dropped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_run_still_finishes() {
        let pipeline = DiscoveryPipeline::new(&ConnectorConfig::default(), None).unwrap();
        let (messages, mut rx) = mpsc::unbounded_channel();
        let (tx, candidates) = mpsc::unbounded_channel::<DiscoveryCandidate>();
        let cancel = CancellationToken::new();

        let engine = async move {
            drop(tx);
            Ok(0)
        };
        let found = pipeline.drive(engine, candidates, &messages, &cancel).await.unwrap();

        assert!(found.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectorMessage::DiscoveryFinished { found: 0, .. }
        ));
    }

    #[tokio::test]
    async fn engine_failure_propagates() {
        let pipeline = DiscoveryPipeline::new(&ConnectorConfig::default(), None).unwrap();
        let (messages, _rx) = mpsc::unbounded_channel();
        let (_tx, candidates) = mpsc::unbounded_channel::<DiscoveryCandidate>();
        let cancel = CancellationToken::new();

        let engine = async { Err(shelly_api::Error::Io(std::io::Error::other("no multicast"))) };
        let err = pipeline
            .drive(engine, candidates, &messages, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }

    #[test]
    fn mdns_window_leaves_room_for_identification() {
        let config = ConnectorConfig {
            discovery_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            ..ConnectorConfig::default()
        };
        assert_eq!(collection_window(&config), Duration::from_secs(20));

        let short = ConnectorConfig {
            discovery_timeout: Duration::from_secs(4),
            ..config
        };
        assert_eq!(collection_window(&short), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_run_finishes_at_the_discovery_timeout() {
        let config = ConnectorConfig {
            discovery_timeout: Duration::from_secs(30),
            ..ConnectorConfig::default()
        };
        let pipeline = DiscoveryPipeline::new(&config, None).unwrap();
        let (messages, mut rx) = mpsc::unbounded_channel();
        let (_tx, candidates) = mpsc::unbounded_channel::<DiscoveryCandidate>();
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let found = pipeline
            .drive(std::future::pending(), candidates, &messages, &cancel)
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(31), "{elapsed:?}");
        assert!(found.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectorMessage::DiscoveryFinished { found: 0, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_run() {
        let pipeline = DiscoveryPipeline::new(&ConnectorConfig::default(), None).unwrap();
        let (messages, mut rx) = mpsc::unbounded_channel();
        let (_tx, candidates) = mpsc::unbounded_channel::<DiscoveryCandidate>();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let found = pipeline
            .drive(std::future::pending(), candidates, &messages, &cancel)
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), ConnectorMessage::DiscoveryFinished { .. }));
    }
}
