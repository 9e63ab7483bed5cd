// Per-device session state, owned by the connector task.

use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::time::Instant;

use shelly_api::FailureKind;
use shelly_api::gen1::Gen1Description;

use crate::model::{ConnectionState, ConnectorMessage, ManagedDevice};

/// An outstanding status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InFlight {
    /// Gen1 HTTP read. Bounded by the HTTP client timeout.
    Http,
    /// Gen2 WebSocket read awaiting the response to `request`.
    WebSocket { request: u64, deadline: Instant },
}

#[derive(Debug)]
pub(crate) struct DeviceSession {
    pub device: ManagedDevice,
    pub state: ConnectionState,
    pub status_delay: Duration,
    pub last_poll: Option<Instant>,
    pub in_flight: Option<InFlight>,
    /// Gen1 `/cit/d`, fetched with the first status read.
    pub description: Option<Gen1Description>,
}

impl DeviceSession {
    pub fn new(device: ManagedDevice, default_delay: Duration) -> Self {
        let status_delay = device.status_reading_delay.unwrap_or(default_delay);
        Self {
            device,
            state: ConnectionState::Unknown,
            status_delay,
            last_poll: None,
            in_flight: None,
            description: None,
        }
    }

    /// Whether a status read may start at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.state.is_stopped()
            && self.in_flight.is_none()
            && self
                .last_poll
                .is_none_or(|last| now.saturating_duration_since(last) >= self.status_delay)
    }

    /// Mark a read as started. Called before the transport call is issued.
    pub fn begin_read(&mut self, now: Instant, read: InFlight) {
        self.last_poll = Some(now);
        self.in_flight = Some(read);
    }

    /// Clear the marker if `request` is the WebSocket read we are waiting on.
    pub fn finish_ws_read(&mut self, request: u64) {
        if matches!(self.in_flight, Some(InFlight::WebSocket { request: r, .. }) if r == request) {
            self.in_flight = None;
        }
    }

    pub fn clear_ws_read(&mut self) {
        if matches!(self.in_flight, Some(InFlight::WebSocket { .. })) {
            self.in_flight = None;
        }
    }

    /// Drop a WebSocket read whose deadline has passed. Returns `true` if
    /// one was dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.in_flight {
            Some(InFlight::WebSocket { deadline, .. }) if deadline <= now => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Move to `state`, returning the message to emit if it changed.
    pub fn transition(
        &mut self,
        state: ConnectionState,
        cause: Option<FailureKind>,
    ) -> Option<ConnectorMessage> {
        if self.state == state {
            return None;
        }
        self.state = state;
        Some(ConnectorMessage::device_state(
            self.device.identifier.clone(),
            state,
            cause,
        ))
    }

    /// Whether `other` describes the same device at the same endpoint with
    /// the same credentials, so the session can be kept across a reload.
    pub fn serves(&self, other: &ManagedDevice) -> bool {
        let ours = &self.device;
        ours.generation == other.generation
            && ours.address() == other.address()
            && ours.username == other.username
            && ours.status_reading_delay == other.status_reading_delay
            && ours.password.as_ref().map(|p| p.expose_secret())
                == other.password.as_ref().map(|p| p.expose_secret())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shelly_api::DeviceGeneration;

    use super::*;

    fn session(delay_secs: u64) -> DeviceSession {
        DeviceSession::new(
            ManagedDevice::new("dev", DeviceGeneration::Gen2).with_address("10.0.0.2"),
            Duration::from_secs(delay_secs),
        )
    }

    #[test]
    fn due_respects_interval_and_in_flight() {
        let start = Instant::now();
        let mut s = session(15);
        assert!(s.is_due(start));

        s.begin_read(start, InFlight::Http);
        assert!(!s.is_due(start + Duration::from_secs(60)));

        s.in_flight = None;
        assert!(!s.is_due(start + Duration::from_secs(14)));
        assert!(s.is_due(start + Duration::from_secs(15)));
    }

    #[test]
    fn stopped_sessions_are_never_due() {
        let mut s = session(0);
        s.transition(ConnectionState::Stopped, Some(FailureKind::Stopped));
        assert!(!s.is_due(Instant::now()));
    }

    #[test]
    fn ws_reads_finish_by_request_id() {
        let now = Instant::now();
        let mut s = session(15);
        s.begin_read(
            now,
            InFlight::WebSocket {
                request: 7,
                deadline: now + Duration::from_secs(10),
            },
        );
        s.finish_ws_read(6);
        assert!(s.in_flight.is_some());
        s.finish_ws_read(7);
        assert!(s.in_flight.is_none());
    }

    #[test]
    fn ws_reads_expire_at_deadline() {
        let now = Instant::now();
        let mut s = session(15);
        s.begin_read(
            now,
            InFlight::WebSocket {
                request: 1,
                deadline: now + Duration::from_secs(10),
            },
        );
        assert!(!s.expire(now + Duration::from_secs(9)));
        assert!(s.expire(now + Duration::from_secs(10)));
        assert!(s.in_flight.is_none());
    }

    #[test]
    fn transitions_only_report_changes() {
        let mut s = session(15);
        assert!(s.transition(ConnectionState::Connected, None).is_some());
        assert!(s.transition(ConnectionState::Connected, None).is_none());
        let msg = s
            .transition(ConnectionState::Alert, Some(FailureKind::AuthorizationRequired))
            .unwrap();
        assert!(matches!(
            msg,
            ConnectorMessage::DeviceState {
                state: ConnectionState::Alert,
                cause: Some(FailureKind::AuthorizationRequired),
                ..
            }
        ));
    }

    #[test]
    fn per_device_delay_overrides_default() {
        let mut device = ManagedDevice::new("dev", DeviceGeneration::Gen1).with_address("10.0.0.3");
        device.status_reading_delay = Some(Duration::from_secs(2));
        let s = DeviceSession::new(device.clone(), Duration::from_secs(15));
        assert_eq!(s.status_delay, Duration::from_secs(2));
        assert!(s.serves(&device));

        let moved = device.with_address("10.0.0.4");
        assert!(!s.serves(&moved));
    }
}
