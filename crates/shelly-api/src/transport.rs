// Shared transport configuration for building reqwest::Client instances.
//
// The Gen1 and Gen2 HTTP clients share timeout and user-agent settings
// through this module, along with status-code classification of responses.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

/// Default per-request timeout. Devices on the LAN answer quickly or not at all.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("shelly-local/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(Error::Transport)
    }
}

/// Check the status line and decode a JSON body.
///
/// 401 becomes [`Error::Unauthorized`]; any other non-success status becomes
/// [`Error::Http`] carrying a short preview of the body.
pub(crate) async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = check_status(resp).await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// Check the status line and return the raw body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            message: preview(&body),
        });
    }

    Ok(body)
}

/// `http://<address><path>`. `address` may carry a port.
pub(crate) fn device_url(address: &str, path: &str) -> Result<Url, Error> {
    Ok(base_url("http", address)?.join(path)?)
}

/// `<scheme>://<address>`, bracketing a bare IPv6 literal.
pub(crate) fn base_url(scheme: &str, address: &str) -> Result<Url, Error> {
    let url = match address.parse::<Ipv6Addr>() {
        Ok(ip) => Url::parse(&format!("{scheme}://[{ip}]"))?,
        Err(_) => Url::parse(&format!("{scheme}://{address}"))?,
    };
    Ok(url)
}

/// IP address behind a device address (`ip`, `ip:port`, `host` or
/// `host:port`).
pub(crate) async fn resolve_ip(address: &str) -> Result<IpAddr, Error> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr.ip());
    }
    let lookup = if address.contains(':') {
        address.to_owned()
    } else {
        format!("{address}:80")
    };
    tokio::net::lookup_host(lookup)
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {address}"),
            ))
        })
}

fn preview(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_owned(),
    }
}
