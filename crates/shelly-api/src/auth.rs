// Device credentials.
//
// Shelly devices use HTTP Basic auth (Gen1, and Gen2 when the request is
// proxied over HTTP) with an `admin` default user. The password is held as
// a `SecretString` so it never ends up in Debug output or logs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

/// Default username for Gen2 devices, which only support `admin`.
pub const DEFAULT_USERNAME: &str = "admin";

/// Username/password pair for a password-protected device.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Attach Basic auth to an outgoing request.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// Value of the `Authorization` header, for the WebSocket upgrade.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Attach credentials when present.
pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    credentials: Option<&Credentials>,
) -> reqwest::RequestBuilder {
    match credentials {
        Some(creds) => creds.apply(request),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_is_base64_of_user_and_password() {
        let creds = Credentials::new("admin", SecretString::from("secret"));
        assert_eq!(creds.authorization_header(), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn debug_output_hides_password() {
        let creds = Credentials::new("admin", SecretString::from("hunter2"));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
    }
}
