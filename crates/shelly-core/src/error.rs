// ── Core error types ──
//
// Errors surfaced by shelly-core to its callers (the CLI, or a host
// embedding the connector). Device transport failures inside the
// connector loop never become a `CoreError`; they are reported as
// connection-state messages instead. This type covers the request paths
// that do return to a caller: one-shot reads, writes and discovery.

use thiserror::Error;

use shelly_api::FailureKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Device requires authorization: {message}")]
    AuthorizationRequired { message: String },

    #[error("Device request timed out")]
    Timeout,

    #[error("Connector is not running")]
    NotConnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    #[error("Operation rejected by device: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Device API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Connection-state bucket for this error, mirroring
    /// [`shelly_api::Error::failure_kind`].
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::AuthorizationRequired { .. } => FailureKind::AuthorizationRequired,
            Self::Api {
                status: Some(500..=599),
                ..
            } => FailureKind::ConnectionLost,
            Self::Api {
                status: Some(400..=499),
                ..
            }
            | Self::Config { .. }
            | Self::Unsupported { .. }
            | Self::ValidationFailed { .. } => FailureKind::Stopped,
            _ => FailureKind::Unknown,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<shelly_api::Error> for CoreError {
    fn from(err: shelly_api::Error) -> Self {
        match err {
            shelly_api::Error::Unauthorized => CoreError::AuthorizationRequired {
                message: "device answered HTTP 401".into(),
            },
            shelly_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        address: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            shelly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device address: {e}"),
            },
            shelly_api::Error::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            shelly_api::Error::Io(e) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: e.to_string(),
            },
            shelly_api::Error::Rpc { code: 401, message } => {
                CoreError::AuthorizationRequired { message }
            }
            shelly_api::Error::Rpc { code, message } => CoreError::Rejected {
                message: format!("{message} (code {code})"),
            },
            shelly_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            shelly_api::Error::WebSocketLost(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("WebSocket connection lost: {reason}"),
            },
            shelly_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            shelly_api::Error::WebSocketNotConnected => CoreError::NotConnected,
            shelly_api::Error::Coap(e) => CoreError::Internal(format!("CoAP: {e}")),
            shelly_api::Error::Mdns(e) => CoreError::Internal(format!("mDNS: {e}")),
            shelly_api::Error::NamePattern(e) => CoreError::Internal(format!("mDNS name pattern: {e}")),
            shelly_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            shelly_api::Error::UnexpectedGeneration(generation) => CoreError::Unsupported {
                operation: format!("device generation {generation}"),
            },
            e @ (shelly_api::Error::InvalidProperty(_)
            | shelly_api::Error::ReadOnlyProperty(_)
            | shelly_api::Error::InvalidValue { .. }) => CoreError::ValidationFailed {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_authorization_required() {
        let err = CoreError::from(shelly_api::Error::Unauthorized);
        assert!(matches!(err, CoreError::AuthorizationRequired { .. }));
        assert_eq!(err.failure_kind(), FailureKind::AuthorizationRequired);
    }

    #[test]
    fn rpc_401_is_also_an_authorization_failure() {
        let err = CoreError::from(shelly_api::Error::Rpc {
            code: 401,
            message: "unauthorized".into(),
        });
        assert!(matches!(err, CoreError::AuthorizationRequired { .. }));
    }

    #[test]
    fn server_errors_keep_their_status() {
        let err = CoreError::from(shelly_api::Error::Http {
            status: 503,
            message: "busy".into(),
        });
        assert!(matches!(err, CoreError::Api { status: Some(503), .. }));
        assert_eq!(err.failure_kind(), FailureKind::ConnectionLost);
    }

    #[test]
    fn property_errors_are_validation_failures() {
        let err = CoreError::from(shelly_api::Error::ReadOnlyProperty("switch_0_voltage".into()));
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert_eq!(err.failure_kind(), FailureKind::Stopped);
    }
}
