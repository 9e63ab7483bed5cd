use serde::Serialize;
use thiserror::Error;

use crate::coap::CoapError;
use crate::mdns::MdnsError;

/// How a failed device call should be reported upstream.
///
/// Every transport failure collapses into one of these buckets so the
/// connector can pick a connection state without inspecting HTTP codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 401: the device is password protected and needs credentials.
    AuthorizationRequired,
    /// 5xx or a dropped session. Worth retrying later.
    ConnectionLost,
    /// 4xx (other than 401) or a configuration problem. Not retried.
    Stopped,
    /// Timeouts, refused connections and everything else.
    Unknown,
}

/// Top-level error type for the `shelly-api` crate.
///
/// Covers every failure mode across the device surfaces: HTTP (Gen1 REST,
/// Gen2 RPC), WebSocket, and the two multicast codecs. `shelly-core` maps
/// these into connection states.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The device answered 401.
    #[error("Device is password protected (HTTP 401)")]
    Unauthorized,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success HTTP status other than 401.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Socket setup or I/O failure (multicast listeners).
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    // ── Gen2 RPC ────────────────────────────────────────────────────
    /// Structured error returned inside a JSON-RPC frame.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// An established session failed mid-stream.
    #[error("WebSocket connection lost: {0}")]
    WebSocketLost(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A command was issued while the session was down.
    #[error("WebSocket is not connected")]
    WebSocketNotConnected,

    // ── Wire codecs ─────────────────────────────────────────────────
    #[error("Malformed CoAP datagram: {0}")]
    Coap(#[from] CoapError),

    #[error("Malformed mDNS message: {0}")]
    Mdns(#[from] MdnsError),

    #[error("Invalid device name pattern: {0}")]
    NamePattern(#[from] regex::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The device reported a generation this client does not speak.
    #[error("Unexpected device generation {0}")]
    UnexpectedGeneration(u8),

    // ── Properties ──────────────────────────────────────────────────
    /// Property identifier does not follow `<component>_<id>_<attribute>`.
    #[error("Invalid property identifier: {0}")]
    InvalidProperty(String),

    /// Property exists but cannot be written.
    #[error("Property {0} is not settable")]
    ReadOnlyProperty(String),

    /// Value has the wrong shape for the property.
    #[error("Invalid value {value} for property {property}")]
    InvalidValue { property: String, value: String },
}

impl Error {
    /// Classify this error for connection-state reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized => FailureKind::AuthorizationRequired,
            Self::Http { status, .. } => classify_status(*status),
            Self::Transport(e) => e
                .status()
                .map_or(FailureKind::Unknown, |s| classify_status(s.as_u16())),
            Self::WebSocketLost(_) | Self::WebSocketClosed { .. } => FailureKind::ConnectionLost,
            Self::UnexpectedGeneration(_)
            | Self::InvalidProperty(_)
            | Self::ReadOnlyProperty(_)
            | Self::InvalidValue { .. } => FailureKind::Stopped,
            _ => FailureKind::Unknown,
        }
    }

    /// Returns `true` if the device rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.failure_kind() == FailureKind::AuthorizationRequired
    }
}

fn classify_status(status: u16) -> FailureKind {
    match status {
        401 => FailureKind::AuthorizationRequired,
        500..=599 => FailureKind::ConnectionLost,
        400..=499 => FailureKind::Stopped,
        _ => FailureKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_distinct_from_server_errors() {
        assert_eq!(
            Error::Unauthorized.failure_kind(),
            FailureKind::AuthorizationRequired
        );
        let server = Error::Http {
            status: 500,
            message: String::new(),
        };
        assert_eq!(server.failure_kind(), FailureKind::ConnectionLost);
    }

    #[test]
    fn client_errors_stop_the_device() {
        let err = Error::Http {
            status: 404,
            message: "not found".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::Stopped);
    }

    #[test]
    fn dropped_session_is_a_lost_connection() {
        let err = Error::WebSocketLost("connection reset".into());
        assert_eq!(err.failure_kind(), FailureKind::ConnectionLost);
        let err = Error::WebSocketConnect("connection refused".into());
        assert_eq!(err.failure_kind(), FailureKind::Unknown);
    }

    #[test]
    fn socket_errors_are_unknown() {
        let err = Error::Io(std::io::Error::other("boom"));
        assert_eq!(err.failure_kind(), FailureKind::Unknown);
        assert!(!err.is_unauthorized());
    }
}
