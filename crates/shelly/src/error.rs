//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use shelly_config::ConfigError;
use shelly_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach device at {address}")]
    #[diagnostic(
        code(shelly::connection_failed),
        help(
            "Check that the device is powered and on the same network.\n\
             Address: {address}"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(shelly::timeout),
        help("Increase the timeout with --timeout or check the device's Wi-Fi signal.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Device is password protected")]
    #[diagnostic(
        code(shelly::auth_required),
        help(
            "Store the device password with: shelly config set-password --device <ID>\n\
             Or set the SHELLY_PASSWORD environment variable."
        )
    )]
    AuthRequired { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(shelly::not_found),
        help("Run: shelly discover to see devices on the network")
    )]
    NotFound { identifier: String },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device error: {message}")]
    #[diagnostic(code(shelly::device_error))]
    Device { message: String },

    #[error("'{operation}' is not supported")]
    #[diagnostic(
        code(shelly::unsupported),
        help("Pass --gen 1 or --gen 2 if the device generation could not be detected.")
    )]
    Unsupported { operation: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(shelly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(shelly::config),
        help(
            "Create a config file with: shelly config init\n\
             Expected at: {path}"
        )
    )]
    Config { message: String, path: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(shelly::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(shelly::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthRequired { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }

            CoreError::AuthorizationRequired { message } => CliError::AuthRequired { message },

            CoreError::Timeout => CliError::Timeout,

            CoreError::NotConnected => CliError::ConnectionFailed {
                address: "(not connected)".into(),
                reason: "the connector is not running".into(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound { identifier },

            CoreError::Unsupported { operation } => CliError::Unsupported { operation },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Rejected { message } => CliError::Device { message },

            CoreError::Api { message, status } => CliError::Device {
                message: match status {
                    Some(code) => format!("HTTP {code}: {message}"),
                    None => message,
                },
            },

            CoreError::Config { message } => CliError::Config {
                message,
                path: shelly_config::config_path().display().to_string(),
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
                path: shelly_config::config_path().display().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_exit_with_auth_code() {
        let err: CliError = CoreError::AuthorizationRequired {
            message: "401".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn unknown_device_exits_with_not_found() {
        let err: CliError = CoreError::DeviceNotFound {
            identifier: "plug".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "connector.poll_tick_ms".into(),
            reason: "must be greater than zero".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
