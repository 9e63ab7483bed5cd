//! Gen2 WebSocket RPC session.
//!
//! One [`WebSocketClient`] per device, talking to `ws://<address>/rpc`. The
//! client is owned by the connector task; each `connect` spawns a session
//! task that reports back through typed [`WsEvent`]s on a shared channel:
//!
//! ```text
//! Connected → Message(initial GetStatus response) → Message(...)* → Disconnected
//! ```
//!
//! Reconnection is not automatic. The owner asks [`WebSocketClient::should_reconnect`]
//! on its own schedule, and the [`ReconnectPolicy`] cool-down keeps a dead
//! device from being hammered.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::client::RPC_SOURCE;
use super::models::{InboundFrame, RpcFrame, RpcRequest, set_command};
use crate::auth::Credentials;
use crate::error::Error;
use crate::property::{PropertyKey, PropertyValue};
use crate::transport::base_url;

const GET_STATUS: &str = "Shelly.GetStatus";

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Minimum interval between connection attempts to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Default: 300s.
    pub cool_down: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            cool_down: Duration::from_secs(300),
        }
    }
}

impl ReconnectPolicy {
    /// Attempt only when not already connecting and either never tried or
    /// the cool-down has passed since the last attempt.
    pub fn should_attempt(&self, last_attempt: Option<Instant>, now: Instant, connecting: bool) -> bool {
        if connecting {
            return false;
        }
        last_attempt.is_none_or(|last| now.saturating_duration_since(last) >= self.cool_down)
    }
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle event from a session task.
#[derive(Debug)]
pub struct WsEvent {
    /// Device identifier the client was created for.
    pub device: String,
    /// Which `connect` call produced this event. Stale sessions are ignored.
    pub session: u64,
    pub kind: WsEventKind,
}

#[derive(Debug)]
pub enum WsEventKind {
    Connected,
    Disconnected,
    Error(Error),
    Message(InboundFrame),
}

// ── WebSocketClient ──────────────────────────────────────────────────

pub struct WebSocketClient {
    device: String,
    url: Url,
    credentials: Option<Credentials>,
    connect_timeout: Duration,
    policy: ReconnectPolicy,
    state: WsState,
    last_attempt: Option<Instant>,
    session: u64,
    next_id: u64,
    outbound: Option<mpsc::UnboundedSender<RpcRequest>>,
    cancel: Option<CancellationToken>,
}

impl WebSocketClient {
    pub fn new(
        device: impl Into<String>,
        address: &str,
        credentials: Option<Credentials>,
        connect_timeout: Duration,
        policy: ReconnectPolicy,
    ) -> Result<Self, Error> {
        let url = base_url("ws", address)?.join("/rpc")?;
        Ok(Self {
            device: device.into(),
            url,
            credentials,
            connect_timeout,
            policy,
            state: WsState::Disconnected,
            last_attempt: None,
            session: 0,
            next_id: 1,
            outbound: None,
            cancel: None,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> WsState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == WsState::Connected
    }

    /// Whether a new connection attempt is allowed at `now`.
    pub fn should_reconnect(&self, now: Instant) -> bool {
        self.state != WsState::Connected
            && self
                .policy
                .should_attempt(self.last_attempt, now, self.state == WsState::Connecting)
    }

    /// Start a session. The attempt is recorded before the socket opens, and
    /// a `Shelly.GetStatus` request is queued so it goes out first.
    ///
    /// Returns the id of that initial status request.
    pub fn connect(
        &mut self,
        events: mpsc::UnboundedSender<WsEvent>,
        parent: &CancellationToken,
    ) -> u64 {
        self.disconnect();

        self.session += 1;
        self.last_attempt = Some(Instant::now());
        self.state = WsState::Connecting;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = parent.child_token();
        self.outbound = Some(tx);
        self.cancel = Some(cancel.clone());

        let initial = self.queue(GET_STATUS, None).unwrap_or_default();

        let session = Session {
            device: self.device.clone(),
            session: self.session,
            url: self.url.clone(),
            authorization: self.credentials.as_ref().map(Credentials::authorization_header),
            connect_timeout: self.connect_timeout,
            events,
        };
        tokio::spawn(session.run(rx, cancel));

        initial
    }

    /// Apply a lifecycle event to the local state. Returns `false` when the
    /// event belongs to an older session and should be ignored.
    pub fn on_event(&mut self, event: &WsEvent) -> bool {
        if event.session != self.session {
            return false;
        }
        match event.kind {
            WsEventKind::Connected => self.state = WsState::Connected,
            WsEventKind::Disconnected => {
                self.state = WsState::Disconnected;
                self.outbound = None;
                self.cancel = None;
            }
            WsEventKind::Error(_) | WsEventKind::Message(_) => {}
        }
        true
    }

    /// Request a full status snapshot. The answer arrives as a
    /// [`WsEventKind::Message`] carrying the returned request id.
    pub fn read_states(&mut self) -> Result<u64, Error> {
        if !self.is_connected() {
            return Err(Error::WebSocketNotConnected);
        }
        self.queue(GET_STATUS, None)
    }

    /// Issue a single-property write.
    pub fn write_state(&mut self, property: &PropertyKey, value: &PropertyValue) -> Result<u64, Error> {
        if !self.is_connected() {
            return Err(Error::WebSocketNotConnected);
        }
        let (method, params) = set_command(property, value)?;
        self.queue(method, Some(params))
    }

    /// Close the session, if any. No `Disconnected` event is expected
    /// afterwards from the closed session.
    pub fn disconnect(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.outbound = None;
        self.state = WsState::Disconnected;
    }

    fn queue(&mut self, method: &str, params: Option<serde_json::Value>) -> Result<u64, Error> {
        let outbound = self.outbound.as_ref().ok_or(Error::WebSocketNotConnected)?;
        let id = self.next_id;
        self.next_id += 1;
        outbound
            .send(RpcRequest {
                id,
                src: RPC_SOURCE.to_owned(),
                method: method.to_owned(),
                params,
            })
            .map_err(|_| Error::WebSocketNotConnected)?;
        Ok(id)
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ── Session task ─────────────────────────────────────────────────────

struct Session {
    device: String,
    session: u64,
    url: Url,
    authorization: Option<String>,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<WsEvent>,
}

impl Session {
    async fn run(self, outbound: mpsc::UnboundedReceiver<RpcRequest>, cancel: CancellationToken) {
        if let Err(e) = self.connect_and_read(outbound, &cancel).await {
            warn!(device = %self.device, error = %e, "WebSocket session failed");
            self.emit(WsEventKind::Error(e));
        }
        if !cancel.is_cancelled() {
            self.emit(WsEventKind::Disconnected);
        }
        debug!(device = %self.device, "WebSocket session ended");
    }

    fn emit(&self, kind: WsEventKind) {
        // Receiver gone means the connector is shutting down.
        let _ = self.events.send(WsEvent {
            device: self.device.clone(),
            session: self.session,
            kind,
        });
    }

    async fn connect_and_read(
        &self,
        mut outbound: mpsc::UnboundedReceiver<RpcRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        debug!(device = %self.device, url = %self.url, "Connecting to WebSocket");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(ref auth) = self.authorization {
            request = request.with_header("Authorization", auth.as_str());
        }

        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(self.connect_timeout, connect) => {
                result
                    .map_err(|_| Error::WebSocketConnect("connection timed out".into()))?
                    .map_err(handshake_error)?
            }
        };

        info!(device = %self.device, "WebSocket connected");
        self.emit(WsEventKind::Connected);

        let (mut write, mut read) = ws_stream.split();
        let mut status_requests: HashSet<u64> = HashSet::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(());
                }
                request = outbound.recv() => {
                    let Some(request) = request else {
                        return Ok(());
                    };
                    if request.method == GET_STATUS {
                        status_requests.insert(request.id);
                    }
                    let text = serde_json::to_string(&request).map_err(|e| Error::Deserialization {
                        message: e.to_string(),
                        body: String::new(),
                    })?;
                    trace!(device = %self.device, %text, "WebSocket send");
                    write
                        .send(tungstenite::Message::text(text))
                        .await
                        .map_err(|e| Error::WebSocketLost(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            if let Some(inbound) = self.parse_frame(&text, &mut status_requests) {
                                self.emit(WsEventKind::Message(inbound));
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite handles pong replies automatically
                            trace!("WebSocket ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(cf) = frame {
                                return Err(Error::WebSocketClosed {
                                    code: u16::from(cf.code),
                                    reason: cf.reason.to_string(),
                                });
                            }
                            info!(device = %self.device, "WebSocket close frame received (no payload)");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketLost(e.to_string()));
                        }
                        None => {
                            info!(device = %self.device, "WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {
                            // Binary, Pong, Frame -- ignore
                        }
                    }
                }
            }
        }
    }

    fn parse_frame(&self, text: &str, status_requests: &mut HashSet<u64>) -> Option<InboundFrame> {
        let frame: RpcFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(device = %self.device, error = %e, "Dropping unparseable WebSocket frame");
                return None;
            }
        };
        let is_status = frame.id.is_some_and(|id| status_requests.remove(&id));
        match frame.classify(|_| is_status) {
            Ok(InboundFrame::Ignored) => None,
            Ok(inbound) => Some(inbound),
            Err(e) => {
                warn!(device = %self.device, error = %e, "Dropping WebSocket status that failed validation");
                None
            }
        }
    }
}

fn handshake_error(e: tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::Http(ref response)
            if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
        {
            Error::Unauthorized
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
