use std::{sync::mpsc::Receiver, thread, time::Duration};

use log::{info, warn};
use thiserror::Error;

/// Wireless station session phase, owned exclusively by [`LinkMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Off,
    Connecting,
    Connected,
    Disconnected,
}

/// Connectivity transitions delivered by the platform network stack.
///
/// The producer side runs on the event-loop context; transitions are only
/// applied while draining the channel from the monitor's own thread, so the
/// state value itself is never shared between execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    AddressAcquired,
    Disconnected,
}

/// Driver operations the monitor needs from the underlying radio.
pub trait StationControl {
    /// Start (or restart) an association attempt with the configured AP.
    fn associate(&mut self);
    /// Tear the session down and stop the radio.
    fn teardown(&mut self);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("wifi link not established after {attempts} polls")]
    ConnectTimeout { attempts: u32 },
}

pub struct LinkMonitor<C: StationControl> {
    control: C,
    events: Receiver<LinkEvent>,
    state: ConnectivityState,
}

impl<C: StationControl> LinkMonitor<C> {
    pub fn new(control: C, events: Receiver<LinkEvent>) -> Self {
        Self {
            control,
            events,
            state: ConnectivityState::Off,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Begin the station session. No-op if already enabled.
    pub fn enable(&mut self) {
        if self.state != ConnectivityState::Off {
            return;
        }
        info!("wifi link enabled, associating");
        self.control.associate();
        self.state = ConnectivityState::Connecting;
    }

    /// Deliberate low-power shutdown. While Off, disconnect events are
    /// ignored and no re-association is attempted.
    pub fn disable(&mut self) {
        self.control.teardown();
        self.state = ConnectivityState::Off;
        info!("wifi link disabled");
    }

    /// Apply every pending event from the network stack.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    /// Block until the link is up, polling once per `retry_delay`.
    ///
    /// Returns as soon as a Connected observation occurs; reports
    /// [`LinkError::ConnectTimeout`] after exactly `max_attempts`
    /// unsuccessful polls. The restart decision belongs to the caller.
    pub fn ensure_connected(
        &mut self,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<(), LinkError> {
        for attempt in 1..=max_attempts {
            self.drain_events();
            if self.state == ConnectivityState::Connected {
                return Ok(());
            }
            if attempt < max_attempts {
                thread::sleep(retry_delay);
            }
        }
        Err(LinkError::ConnectTimeout {
            attempts: max_attempts,
        })
    }

    fn apply(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected | LinkEvent::AddressAcquired => {
                if self.state != ConnectivityState::Off {
                    self.state = ConnectivityState::Connected;
                }
            }
            LinkEvent::Disconnected => {
                if self.state == ConnectivityState::Off {
                    return;
                }
                warn!("wifi station disconnected, re-associating");
                self.state = ConnectivityState::Disconnected;
                self.control.associate();
                self.state = ConnectivityState::Connecting;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Default)]
    struct FakeRadio {
        associate_calls: u32,
        teardown_calls: u32,
    }

    impl StationControl for &mut FakeRadio {
        fn associate(&mut self) {
            self.associate_calls += 1;
        }

        fn teardown(&mut self) {
            self.teardown_calls += 1;
        }
    }

    #[test]
    fn enable_starts_an_association_attempt() {
        let mut radio = FakeRadio::default();
        let (_tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        assert_eq!(link.state(), ConnectivityState::Connecting);

        // Re-enabling while active must not re-associate.
        link.enable();
        drop(link);
        assert_eq!(radio.associate_calls, 1);
    }

    #[test]
    fn ensure_connected_returns_on_connected_observation() {
        let mut radio = FakeRadio::default();
        let (tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        tx.send(LinkEvent::Connected).unwrap();
        tx.send(LinkEvent::AddressAcquired).unwrap();

        assert_eq!(link.ensure_connected(30, Duration::ZERO), Ok(()));
        assert_eq!(link.state(), ConnectivityState::Connected);
    }

    #[test]
    fn ensure_connected_times_out_after_exact_attempt_budget() {
        let mut radio = FakeRadio::default();
        let (_tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        assert_eq!(
            link.ensure_connected(30, Duration::ZERO),
            Err(LinkError::ConnectTimeout { attempts: 30 })
        );
    }

    #[test]
    fn disconnect_while_enabled_reassociates() {
        let mut radio = FakeRadio::default();
        let (tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        tx.send(LinkEvent::Connected).unwrap();
        link.drain_events();
        assert_eq!(link.state(), ConnectivityState::Connected);

        tx.send(LinkEvent::Disconnected).unwrap();
        link.drain_events();
        assert_eq!(link.state(), ConnectivityState::Connecting);
        drop(link);
        assert_eq!(radio.associate_calls, 2);
    }

    #[test]
    fn disconnect_while_disabled_is_ignored() {
        let mut radio = FakeRadio::default();
        let (tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        link.disable();
        tx.send(LinkEvent::Disconnected).unwrap();
        link.drain_events();

        assert_eq!(link.state(), ConnectivityState::Off);
        drop(link);
        assert_eq!(radio.associate_calls, 1);
        assert_eq!(radio.teardown_calls, 1);
    }

    #[test]
    fn stale_connected_event_does_not_wake_a_disabled_link() {
        let mut radio = FakeRadio::default();
        let (tx, rx) = mpsc::channel();
        let mut link = LinkMonitor::new(&mut radio, rx);

        link.enable();
        link.disable();
        tx.send(LinkEvent::Connected).unwrap();
        link.drain_events();

        assert_eq!(link.state(), ConnectivityState::Off);
    }
}
