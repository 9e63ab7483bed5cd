// Round-robin poll scheduling: one device per tick, each device at most
// once per round.

use std::collections::{BTreeMap, HashSet};

use tokio::time::Instant;

use super::session::DeviceSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Start a status read on this device.
    Dispatch(String),
    /// A device was visited but is not due.
    Wait,
    /// Every device has been visited; the next tick starts a new round.
    RoundComplete,
}

#[derive(Debug, Default)]
pub(crate) struct PollScheduler {
    visited: HashSet<String>,
}

impl PollScheduler {
    pub fn next(&mut self, sessions: &BTreeMap<String, DeviceSession>, now: Instant) -> Tick {
        let candidate = sessions
            .iter()
            .find(|(id, session)| !session.state.is_stopped() && !self.visited.contains(*id));

        let Some((id, session)) = candidate else {
            self.visited.clear();
            return Tick::RoundComplete;
        };

        self.visited.insert(id.clone());
        if session.is_due(now) {
            Tick::Dispatch(id.clone())
        } else {
            Tick::Wait
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use shelly_api::{DeviceGeneration, FailureKind};

    use super::*;
    use crate::connector::session::InFlight;
    use crate::model::{ConnectionState, ManagedDevice};

    fn sessions(count: usize, delay: Duration) -> BTreeMap<String, DeviceSession> {
        (0..count)
            .map(|i| {
                let id = format!("dev-{i:02}");
                let device = ManagedDevice::new(id.clone(), DeviceGeneration::Gen1)
                    .with_address(format!("10.0.0.{}", i + 1));
                (id, DeviceSession::new(device, delay))
            })
            .collect()
    }

    #[test]
    fn one_device_per_tick_then_round_resets() {
        let mut sched = PollScheduler::default();
        let sessions = sessions(2, Duration::ZERO);
        let now = Instant::now();

        assert_eq!(sched.next(&sessions, now), Tick::Dispatch("dev-00".into()));
        assert_eq!(sched.next(&sessions, now), Tick::Dispatch("dev-01".into()));
        assert_eq!(sched.next(&sessions, now), Tick::RoundComplete);
        assert_eq!(sched.next(&sessions, now), Tick::Dispatch("dev-00".into()));
    }

    #[test]
    fn stopped_devices_are_skipped() {
        let mut sched = PollScheduler::default();
        let mut sessions = sessions(2, Duration::ZERO);
        sessions
            .get_mut("dev-00")
            .unwrap()
            .transition(ConnectionState::Stopped, Some(FailureKind::Stopped));

        let now = Instant::now();
        assert_eq!(sched.next(&sessions, now), Tick::Dispatch("dev-01".into()));
        assert_eq!(sched.next(&sessions, now), Tick::RoundComplete);
    }

    #[test]
    fn devices_inside_their_interval_wait() {
        let mut sched = PollScheduler::default();
        let mut sessions = sessions(1, Duration::from_secs(15));
        let now = Instant::now();
        sessions.get_mut("dev-00").unwrap().last_poll = Some(now);

        assert_eq!(sched.next(&sessions, now + Duration::from_secs(5)), Tick::Wait);
    }

    proptest! {
        /// Drive N devices for M ticks with random completions: the
        /// scheduler never dispatches a device whose read is still
        /// outstanding, nor one inside its re-poll interval.
        #[test]
        fn reads_never_overlap(
            devices in 1_usize..8,
            delay_ticks in 0_u64..20,
            completions in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 8), 1..300),
        ) {
            let tick = Duration::from_millis(10);
            let delay = tick * u32::try_from(delay_ticks).unwrap();
            let mut sessions = sessions(devices, delay);
            let mut sched = PollScheduler::default();
            let start = Instant::now();

            for (n, done) in completions.iter().enumerate() {
                let now = start + tick * u32::try_from(n).unwrap();

                for (session, finished) in sessions.values_mut().zip(done) {
                    if *finished {
                        session.in_flight = None;
                    }
                }

                if let Tick::Dispatch(id) = sched.next(&sessions, now) {
                    let session = sessions.get_mut(&id).unwrap();
                    prop_assert!(session.in_flight.is_none());
                    if let Some(last) = session.last_poll {
                        prop_assert!(now.saturating_duration_since(last) >= delay);
                    }
                    session.begin_read(now, InFlight::Http);
                }
            }
        }
    }
}
