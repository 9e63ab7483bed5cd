use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use shelly_api::FailureKind;

/// Connection state of one managed device, as reported to the host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// Was reachable, then failed with a server error or a dropped session.
    Lost,
    /// The device needs credentials we do not have, or rejected ours.
    Alert,
    #[default]
    Unknown,
    /// Permanently parked: bad configuration or a non-retryable client error.
    Stopped,
}

impl ConnectionState {
    /// State to enter after a failure of the given kind.
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::AuthorizationRequired => Self::Alert,
            FailureKind::ConnectionLost => Self::Lost,
            FailureKind::Stopped => Self::Stopped,
            FailureKind::Unknown => Self::Unknown,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}
