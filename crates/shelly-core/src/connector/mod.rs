// ── Connector ──
//
// Full lifecycle management for local Shelly devices. A single background
// task owns every device session and drives a `select!` loop over the poll
// tick, CoAP pushes, WebSocket lifecycle events, in-flight Gen1 reads and
// write commands. Nothing in that loop is fatal: transport failures become
// connection-state messages and the loop reschedules.

mod scheduler;
mod session;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use shelly_api::coap::{CoapListener, CoapStatus};
use shelly_api::gen1::{Gen1Description, Gen1Status};
use shelly_api::gen2::{InboundFrame, WebSocketClient, WsEvent, WsEventKind, WsState};
use shelly_api::{
    Credentials, DeviceGeneration, DeviceStatus, FailureKind, Gen1Client, Gen2Client, PropertyKey,
    PropertyValue,
};

use crate::config::ConnectorConfig;
use crate::error::CoreError;
use crate::model::{ConnectionState, ConnectorMessage};
use crate::normalize::normalize_status;
use crate::repository::DeviceRepository;

use self::scheduler::{PollScheduler, Tick};
use self::session::{DeviceSession, InFlight};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// A single-property write routed to the connector task.
struct WriteCommand {
    device: String,
    property: PropertyKey,
    value: PropertyValue,
    response_tx: oneshot::Sender<Result<(), CoreError>>,
}

// ── Connector ────────────────────────────────────────────────────────

/// Manages live sessions with every device in a [`DeviceRepository`].
///
/// Cheaply cloneable via `Arc<ConnectorInner>`. Messages go out on the
/// channel passed to [`Connector::new`].
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    config: ConnectorConfig,
    repository: Arc<dyn DeviceRepository>,
    messages: mpsc::UnboundedSender<ConnectorMessage>,
    /// Host-provided CoAP socket, used instead of joining the CoIoT group.
    coap_socket: Mutex<Option<std::net::UdpSocket>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    command_tx: mpsc::Sender<WriteCommand>,
    task: JoinHandle<()>,
}

impl Drop for ConnectorInner {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl Connector {
    pub fn new(
        config: ConnectorConfig,
        repository: Arc<dyn DeviceRepository>,
        messages: mpsc::UnboundedSender<ConnectorMessage>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                config,
                repository,
                messages,
                coap_socket: Mutex::new(None),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    /// Receive CoAP pushes on `socket` rather than binding the CoIoT
    /// multicast group. Takes effect on the next [`connect`](Self::connect).
    pub async fn set_coap_socket(&self, socket: std::net::UdpSocket) {
        *self.inner.coap_socket.lock().await = Some(socket);
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Start the connector task. A second call while running is a no-op.
    ///
    /// Failing to bind the CoAP socket is not an error: Gen1 devices are
    /// then served by polling alone.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let config = self.inner.config.clone();
        let transport = config.transport();
        let gen1 = Gen1Client::new(&transport)?;
        let gen2 = Arc::new(Gen2Client::new(&transport)?);

        let cancel = CancellationToken::new();
        let coap = if config.coap_enabled {
            let preset = self.inner.coap_socket.lock().await;
            start_coap(&config, preset.as_ref(), &cancel)
        } else {
            None
        };
        let (ws_tx, ws_events) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        let worker = Worker {
            config,
            repository: Arc::clone(&self.inner.repository),
            messages: self.inner.messages.clone(),
            gen1,
            gen2,
            cancel: cancel.clone(),
            ws_tx,
            sessions: BTreeMap::new(),
            pool: HashMap::new(),
            scheduler: PollScheduler::default(),
            repository_version: None,
        };
        let task = tokio::spawn(worker.run(Channels {
            coap,
            ws_events,
            commands,
        }));

        *running = Some(Running {
            cancel,
            command_tx,
            task,
        });
        info!("connector started");
        Ok(())
    }

    /// Stop the task, closing the CoAP socket and every WebSocket session.
    pub async fn disconnect(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "connector task ended abnormally");
        }
        info!("connector stopped");
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write one property on a managed device.
    ///
    /// Gen2 writes go over the device's WebSocket when it is connected
    /// (resolving once the frame is queued), otherwise over HTTP RPC.
    /// Gen1 writes always use HTTP.
    pub async fn write_state(
        &self,
        device: &str,
        property: PropertyKey,
        value: PropertyValue,
    ) -> Result<(), CoreError> {
        let command_tx = {
            let running = self.inner.running.lock().await;
            running
                .as_ref()
                .map(|r| r.command_tx.clone())
                .ok_or(CoreError::NotConnected)?
        };

        let (tx, rx) = oneshot::channel();
        command_tx
            .send(WriteCommand {
                device: device.to_owned(),
                property,
                value,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::NotConnected)?;

        rx.await.map_err(|_| CoreError::NotConnected)?
    }
}

fn start_coap(
    config: &ConnectorConfig,
    preset: Option<&std::net::UdpSocket>,
    cancel: &CancellationToken,
) -> Option<mpsc::UnboundedReceiver<CoapStatus>> {
    let listener = match preset {
        Some(socket) => adopt_socket(socket),
        None => CoapListener::bind(config.bind_address),
    };
    match listener {
        Ok(listener) => {
            let (tx, rx) = mpsc::unbounded_channel();
            listener.spawn(tx, cancel.child_token());
            Some(rx)
        }
        Err(e) => {
            warn!(error = %e, "CoAP listener unavailable, Gen1 devices will be polled only");
            None
        }
    }
}

fn adopt_socket(socket: &std::net::UdpSocket) -> Result<CoapListener, shelly_api::Error> {
    let socket = socket.try_clone()?;
    socket.set_nonblocking(true)?;
    Ok(CoapListener::from_socket(tokio::net::UdpSocket::from_std(socket)?))
}

// ── Worker task ──────────────────────────────────────────────────────

type ReadFuture = Pin<Box<dyn Future<Output = ReadOutcome> + Send>>;

struct ReadOutcome {
    device: String,
    result: Result<Gen1Read, shelly_api::Error>,
}

struct Gen1Read {
    /// Present when this read also fetched `/cit/d`.
    description: Option<Gen1Description>,
    status: Gen1Status,
}

struct Channels {
    coap: Option<mpsc::UnboundedReceiver<CoapStatus>>,
    ws_events: mpsc::UnboundedReceiver<WsEvent>,
    commands: mpsc::Receiver<WriteCommand>,
}

struct Worker {
    config: ConnectorConfig,
    repository: Arc<dyn DeviceRepository>,
    messages: mpsc::UnboundedSender<ConnectorMessage>,
    gen1: Gen1Client,
    gen2: Arc<Gen2Client>,
    cancel: CancellationToken,
    ws_tx: mpsc::UnboundedSender<WsEvent>,
    sessions: BTreeMap<String, DeviceSession>,
    /// WebSocket clients keyed by device id. Cleared on shutdown.
    pool: HashMap<String, WebSocketClient>,
    scheduler: PollScheduler,
    repository_version: Option<u64>,
}

impl Worker {
    async fn run(mut self, mut channels: Channels) {
        self.sync_devices();

        let mut tick = tokio::time::interval(self.config.poll_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reads: FuturesUnordered<ReadFuture> = FuturesUnordered::new();
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(command) = channels.commands.recv() => self.handle_command(command),
                Some(event) = channels.ws_events.recv() => self.handle_ws_event(event),
                Some(push) = recv_coap(&mut channels.coap) => self.handle_coap(push),
                Some(outcome) = reads.next(), if !reads.is_empty() => self.handle_read(outcome),
                _ = tick.tick() => self.tick(&mut reads),
            }
        }

        self.shutdown();
    }

    // ── Polling ──────────────────────────────────────────────────────

    fn tick(&mut self, reads: &mut FuturesUnordered<ReadFuture>) {
        let now = Instant::now();
        self.expire_reads(now);

        match self.scheduler.next(&self.sessions, now) {
            Tick::Dispatch(id) => self.dispatch(&id, now, reads),
            Tick::Wait => {}
            Tick::RoundComplete => self.sync_devices(),
        }
    }

    fn dispatch(&mut self, id: &str, now: Instant, reads: &mut FuturesUnordered<ReadFuture>) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let Some(address) = session.device.address().map(str::to_owned) else {
            return;
        };

        match session.device.generation {
            DeviceGeneration::Gen1 => {
                session.begin_read(now, InFlight::Http);
                trace!(device = id, %address, "Gen1 status read");
                reads.push(Box::pin(read_gen1(
                    self.gen1.clone(),
                    id.to_owned(),
                    address,
                    session.device.credentials(),
                    session.description.is_none(),
                )));
            }
            DeviceGeneration::Gen2 => {
                let client = match self.pool.entry(id.to_owned()) {
                    std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        match WebSocketClient::new(
                            id,
                            &address,
                            session.device.credentials(),
                            self.config.request_timeout,
                            self.config.reconnect_policy(),
                        ) {
                            Ok(client) => entry.insert(client),
                            Err(e) => {
                                warn!(device = id, %address, error = %e, "invalid device address");
                                emit_opt(
                                    &self.messages,
                                    session.transition(ConnectionState::Stopped, Some(FailureKind::Stopped)),
                                );
                                return;
                            }
                        }
                    }
                };

                if client.is_connected() {
                    match client.read_states() {
                        Ok(request) => session.begin_read(
                            now,
                            InFlight::WebSocket {
                                request,
                                deadline: now + self.config.request_timeout,
                            },
                        ),
                        Err(e) => fail(&self.messages, session, &e),
                    }
                } else if client.should_reconnect(now) {
                    debug!(device = id, url = %client.url(), "opening WebSocket");
                    let request = client.connect(self.ws_tx.clone(), &self.cancel);
                    // Connect plus the initial status response.
                    session.begin_read(
                        now,
                        InFlight::WebSocket {
                            request,
                            deadline: now + self.config.request_timeout * 2,
                        },
                    );
                } else if client.state() == WsState::Disconnected {
                    trace!(device = id, "reconnect cooling down");
                    if !matches!(session.state, ConnectionState::Alert | ConnectionState::Lost) {
                        emit_opt(
                            &self.messages,
                            session.transition(ConnectionState::Disconnected, None),
                        );
                    }
                }
            }
            DeviceGeneration::Unknown => {
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Stopped, Some(FailureKind::Stopped)),
                );
            }
        }
    }

    fn expire_reads(&mut self, now: Instant) {
        for (id, session) in &mut self.sessions {
            if session.expire(now) {
                warn!(device = %id, "status read timed out");
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Unknown, Some(FailureKind::Unknown)),
                );
            }
        }
    }

    fn handle_read(&mut self, outcome: ReadOutcome) {
        let Some(session) = self.sessions.get_mut(&outcome.device) else {
            trace!(device = %outcome.device, "read completed for a removed device");
            return;
        };
        if session.in_flight != Some(InFlight::Http) {
            trace!(device = %outcome.device, "stale read completion");
            return;
        }
        session.in_flight = None;

        match outcome.result {
            Ok(read) => {
                if read.description.is_some() {
                    session.description = read.description;
                }
                publish(
                    &self.messages,
                    &outcome.device,
                    &DeviceStatus::Gen1(read.status),
                    session.description.as_ref(),
                );
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Connected, None),
                );
            }
            Err(e) => fail(&self.messages, session, &e),
        }
    }

    // ── Push paths ───────────────────────────────────────────────────

    fn handle_coap(&mut self, push: CoapStatus) {
        let Some(session) = self.sessions.values_mut().find(|s| {
            s.device.generation == DeviceGeneration::Gen1
                && (s.device.matches_coap_id(&push.device_id) || s.device.ip() == Some(push.source))
        }) else {
            trace!(device_id = %push.device_id, source = %push.source, "CoAP push from unmanaged device");
            return;
        };

        if session.state.is_stopped() {
            return;
        }
        if session.description.is_none() {
            debug!(device = %session.device.identifier, "CoAP push before description, dropped");
            return;
        }

        publish(
            &self.messages,
            &session.device.identifier,
            &DeviceStatus::Gen1(push.status),
            session.description.as_ref(),
        );
        emit_opt(
            &self.messages,
            session.transition(ConnectionState::Connected, None),
        );
    }

    fn handle_ws_event(&mut self, event: WsEvent) {
        let Some(client) = self.pool.get_mut(&event.device) else {
            return;
        };
        if !client.on_event(&event) {
            trace!(device = %event.device, session = event.session, "stale WebSocket event");
            return;
        }
        let Some(session) = self.sessions.get_mut(&event.device) else {
            return;
        };

        match event.kind {
            WsEventKind::Connected => {
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Connected, None),
                );
            }
            WsEventKind::Disconnected => {
                session.clear_ws_read();
                if session.state == ConnectionState::Connected {
                    emit_opt(
                        &self.messages,
                        session.transition(ConnectionState::Disconnected, None),
                    );
                }
            }
            WsEventKind::Error(e) => {
                session.clear_ws_read();
                fail(&self.messages, session, &e);
            }
            WsEventKind::Message(frame) => match frame {
                InboundFrame::Status {
                    status, request_id, ..
                } => {
                    if let Some(request) = request_id {
                        session.finish_ws_read(request);
                    }
                    publish(&self.messages, &event.device, &DeviceStatus::Gen2(status), None);
                    emit_opt(
                        &self.messages,
                        session.transition(ConnectionState::Connected, None),
                    );
                }
                InboundFrame::Ack { id } => {
                    debug!(device = %event.device, id, "write acknowledged");
                }
                InboundFrame::RpcError { id, error } => {
                    if let Some(id) = id {
                        session.finish_ws_read(id);
                    }
                    if error.code == 401 {
                        warn!(device = %event.device, "device requires authorization");
                        emit_opt(
                            &self.messages,
                            session.transition(
                                ConnectionState::Alert,
                                Some(FailureKind::AuthorizationRequired),
                            ),
                        );
                    } else {
                        warn!(
                            device = %event.device,
                            code = error.code,
                            message = %error.message,
                            "RPC error"
                        );
                    }
                }
                InboundFrame::Ignored => {}
            },
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: WriteCommand) {
        let WriteCommand {
            device,
            property,
            value,
            response_tx,
        } = command;

        let Some(session) = self.sessions.get(&device) else {
            let _ = response_tx.send(Err(CoreError::DeviceNotFound { identifier: device }));
            return;
        };
        let Some(address) = session.device.address().map(str::to_owned) else {
            let _ = response_tx.send(Err(CoreError::Config {
                message: format!("device {device} has no address"),
            }));
            return;
        };
        let credentials = session.device.credentials();
        debug!(%device, %property, %value, "write requested");

        match session.device.generation {
            DeviceGeneration::Gen2 => {
                if let Some(client) = self.pool.get_mut(&device).filter(|c| c.is_connected()) {
                    let result = client
                        .write_state(&property, &value)
                        .map(|id| trace!(%device, id, "write queued on WebSocket"))
                        .map_err(CoreError::from);
                    let _ = response_tx.send(result);
                    return;
                }
                let gen2 = Arc::clone(&self.gen2);
                tokio::spawn(async move {
                    let result = gen2
                        .set_device_state(&address, credentials.as_ref(), &property, &value)
                        .await
                        .map(|_| ())
                        .map_err(CoreError::from);
                    let _ = response_tx.send(result);
                });
            }
            DeviceGeneration::Gen1 => {
                let gen1 = self.gen1.clone();
                tokio::spawn(async move {
                    let result = gen1
                        .set_device_state(&address, credentials.as_ref(), &property, &value)
                        .await
                        .map_err(CoreError::from);
                    let _ = response_tx.send(result);
                });
            }
            DeviceGeneration::Unknown => {
                let _ = response_tx.send(Err(CoreError::Unsupported {
                    operation: format!("write to device {device} of unknown generation"),
                }));
            }
        }
    }

    // ── Device list ──────────────────────────────────────────────────

    /// Reconcile sessions with the repository when it has changed.
    fn sync_devices(&mut self) {
        let version = self.repository.version();
        if self.repository_version == Some(version) {
            return;
        }
        self.repository_version = Some(version);

        let devices = self.repository.devices();
        self.sessions
            .retain(|id, _| devices.iter().any(|d| &d.identifier == id));
        self.pool.retain(|id, _| self.sessions.contains_key(id));

        for device in devices {
            if self
                .sessions
                .get(&device.identifier)
                .is_some_and(|s| s.serves(&device))
            {
                continue;
            }

            self.pool.remove(&device.identifier);
            let id = device.identifier.clone();
            let mut session = DeviceSession::new(device, self.config.status_reading_delay);

            if session.device.is_manageable() {
                debug!(device = %id, generation = %session.device.generation, "managing device");
            } else {
                warn!(
                    device = %id,
                    generation = %session.device.generation,
                    "device has no address or an unknown generation, not polling it"
                );
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Stopped, Some(FailureKind::Stopped)),
                );
            }
            self.sessions.insert(id, session);
        }
    }

    fn shutdown(&mut self) {
        for client in self.pool.values_mut() {
            client.disconnect();
        }
        self.pool.clear();

        for session in self.sessions.values_mut() {
            if session.state == ConnectionState::Connected {
                emit_opt(
                    &self.messages,
                    session.transition(ConnectionState::Disconnected, None),
                );
            }
        }
        debug!("connector task finished");
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn read_gen1(
    client: Gen1Client,
    device: String,
    address: String,
    credentials: Option<Credentials>,
    needs_description: bool,
) -> ReadOutcome {
    let result = async {
        let description = if needs_description {
            Some(
                client
                    .get_device_description(&address, credentials.as_ref())
                    .await?,
            )
        } else {
            None
        };
        let status = client
            .get_device_status(&address, credentials.as_ref())
            .await?;
        Ok(Gen1Read {
            description,
            status,
        })
    }
    .await;

    ReadOutcome { device, result }
}

async fn recv_coap(rx: &mut Option<mpsc::UnboundedReceiver<CoapStatus>>) -> Option<CoapStatus> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Classify a transport failure and move the session accordingly.
fn fail(
    messages: &mpsc::UnboundedSender<ConnectorMessage>,
    session: &mut DeviceSession,
    error: &shelly_api::Error,
) {
    let kind = error.failure_kind();
    if kind == FailureKind::AuthorizationRequired {
        warn!(device = %session.device.identifier, "device requires authorization");
    } else {
        warn!(device = %session.device.identifier, error = %error, ?kind, "device request failed");
    }
    emit_opt(
        messages,
        session.transition(ConnectionState::from_failure(kind), Some(kind)),
    );
}

/// Normalize a status payload and emit one message per property.
fn publish(
    messages: &mpsc::UnboundedSender<ConnectorMessage>,
    device: &str,
    status: &DeviceStatus,
    description: Option<&Gen1Description>,
) {
    for property in normalize_status(status, description) {
        emit(
            messages,
            ConnectorMessage::property_status(device.to_owned(), property),
        );
    }
}

fn emit(messages: &mpsc::UnboundedSender<ConnectorMessage>, message: ConnectorMessage) {
    if messages.send(message).is_err() {
        trace!("message receiver dropped");
    }
}

fn emit_opt(messages: &mpsc::UnboundedSender<ConnectorMessage>, message: Option<ConnectorMessage>) {
    if let Some(message) = message {
        emit(messages, message);
    }
}
