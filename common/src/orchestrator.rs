use std::{thread, time::Duration};

use log::{info, warn};
use thiserror::Error;

use crate::{
    clock::{self, EpochSource, TimeAuthority},
    config::NodeConfig,
    guard::{AnchorStore, DriftExceeded, TimeIntegrityGuard},
    link::{LinkError, LinkMonitor, StationControl},
    report::{ReportTransport, TelemetryReporter},
    update::UpdateService,
};

/// Temperature probe, degrees Celsius.
pub trait SensorProbe {
    fn sample(&mut self) -> f32;
}

/// Conditions with no in-process recovery path. The caller owns the
/// restart mechanism; nothing below the orchestrator restarts the device.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Connectivity(#[from] LinkError),
    #[error(transparent)]
    Drift(#[from] DriftExceeded),
}

/// Top-level control loop: anchor connectivity and time once at boot,
/// then sample and report at a fixed cadence, re-validating both on
/// every cycle.
pub struct Orchestrator<C, S, A, T, P, U>
where
    C: StationControl,
    S: EpochSource,
    A: AnchorStore,
    T: ReportTransport,
    P: SensorProbe,
    U: UpdateService,
{
    link: LinkMonitor<C>,
    clock: TimeAuthority<S>,
    guard: TimeIntegrityGuard<A>,
    reporter: TelemetryReporter<T>,
    probe: P,
    updates: U,
    metric: String,
    utc_offset_secs: i32,
    connect_attempts: u32,
    retry_delay: Duration,
    report_interval: Duration,
}

impl<C, S, A, T, P, U> Orchestrator<C, S, A, T, P, U>
where
    C: StationControl,
    S: EpochSource,
    A: AnchorStore,
    T: ReportTransport,
    P: SensorProbe,
    U: UpdateService,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &NodeConfig,
        link: LinkMonitor<C>,
        clock: TimeAuthority<S>,
        guard: TimeIntegrityGuard<A>,
        reporter: TelemetryReporter<T>,
        probe: P,
        updates: U,
    ) -> Self {
        Self {
            link,
            clock,
            guard,
            reporter,
            probe,
            updates,
            metric: config.telemetry.metric.clone(),
            utc_offset_secs: config.time.utc_offset_secs,
            connect_attempts: config.link.connect_attempts,
            retry_delay: Duration::from_millis(config.link.retry_delay_ms),
            report_interval: Duration::from_millis(config.telemetry.report_interval_ms),
        }
    }

    /// One-time boot sequence: bring the link up and establish the time
    /// anchor before the first reading is ever reported.
    pub fn boot(&mut self) -> Result<(), FatalError> {
        self.link.enable();
        self.link
            .ensure_connected(self.connect_attempts, self.retry_delay)?;

        let epoch = self.clock.wait_for_epoch();
        let reference = self.guard.validate(epoch)?;
        info!(
            "boot complete: time {} (reference epoch {reference})",
            clock::format_local(epoch, self.utc_offset_secs)
        );
        Ok(())
    }

    /// One reporting cycle. Report failures are contained here; only
    /// connectivity exhaustion and drift violations escalate.
    pub fn run_cycle(&mut self) -> Result<(), FatalError> {
        self.updates.poll();

        self.link
            .ensure_connected(self.connect_attempts, self.retry_delay)?;

        let reading = self.probe.sample();
        let epoch = self.clock.wait_for_epoch();
        self.guard.validate(epoch)?;

        let timestamp = clock::format_local(epoch, self.utc_offset_secs);
        match self
            .reporter
            .report(&self.metric, reading, epoch, timestamp)
        {
            Ok(response) => info!("telemetry accepted: HTTP {} [{}]", response.status, response.body),
            Err(err) => warn!("telemetry report failed: {err}"),
        }
        Ok(())
    }

    /// Steady state. Returns only with the fatal condition that should
    /// trigger a device restart.
    pub fn run(&mut self) -> FatalError {
        loop {
            if let Err(fatal) = self.run_cycle() {
                return fatal;
            }
            thread::sleep(self.report_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        mpsc::{self, Sender},
        Arc,
    };

    use crate::{
        guard::{MemoryAnchor, ONE_MONTH_SECS},
        identity::DeviceIdentity,
        link::LinkEvent,
        report::{ReportError, TransportResponse},
        update::NoUpdates,
    };

    const BUILD_EPOCH: i64 = 1_760_000_000;

    struct InstantRadio {
        events: Sender<LinkEvent>,
    }

    impl StationControl for InstantRadio {
        fn associate(&mut self) {
            let _ = self.events.send(LinkEvent::Connected);
            let _ = self.events.send(LinkEvent::AddressAcquired);
        }

        fn teardown(&mut self) {}
    }

    struct DeadRadio;

    impl StationControl for DeadRadio {
        fn associate(&mut self) {}
        fn teardown(&mut self) {}
    }

    struct SteppingClock {
        epoch: i64,
        step: i64,
    }

    impl EpochSource for SteppingClock {
        fn now_epoch(&mut self) -> i64 {
            let epoch = self.epoch;
            self.epoch += self.step;
            epoch
        }
    }

    struct RecordingTransport {
        status: i32,
        posts: Arc<AtomicU32>,
    }

    impl ReportTransport for RecordingTransport {
        fn post(&mut self, _body: &str) -> Result<TransportResponse, ReportError> {
            self.posts.fetch_add(1, Ordering::Relaxed);
            Ok(TransportResponse {
                status: self.status,
                body: String::new(),
            })
        }
    }

    struct FixedProbe(f32);

    impl SensorProbe for FixedProbe {
        fn sample(&mut self) -> f32 {
            self.0
        }
    }

    type TestOrchestrator = Orchestrator<
        InstantRadio,
        SteppingClock,
        MemoryAnchor,
        RecordingTransport,
        FixedProbe,
        NoUpdates,
    >;

    fn orchestrator_with(clock: SteppingClock, status: i32) -> (TestOrchestrator, Arc<AtomicU32>) {
        let posts = Arc::new(AtomicU32::new(0));
        let mut config = NodeConfig::default();
        config.link.retry_delay_ms = 0;
        let (tx, rx) = mpsc::channel();
        let link = LinkMonitor::new(InstantRadio { events: tx }, rx);
        let authority = TimeAuthority::new(clock, Duration::ZERO);
        let guard = TimeIntegrityGuard::new(MemoryAnchor::default(), BUILD_EPOCH);
        let reporter = TelemetryReporter::new(
            RecordingTransport {
                status,
                posts: posts.clone(),
            },
            DeviceIdentity::from_hardware_id(0xBEEF_0000_0001),
        );
        let orchestrator = Orchestrator::new(
            &config,
            link,
            authority,
            guard,
            reporter,
            FixedProbe(23.4),
            NoUpdates,
        );
        (orchestrator, posts)
    }

    #[test]
    fn boot_anchors_time_after_link_comes_up() {
        let (mut orchestrator, _posts) = orchestrator_with(
            SteppingClock {
                epoch: BUILD_EPOCH + 50,
                step: 1,
            },
            200,
        );
        assert!(orchestrator.boot().is_ok());
        assert_eq!(orchestrator.guard.reference_epoch(), BUILD_EPOCH + 50);
    }

    #[test]
    fn boot_fails_fatally_when_link_never_appears() {
        let mut config = NodeConfig::default();
        config.link.connect_attempts = 3;
        config.link.retry_delay_ms = 0;
        let (_tx, rx) = mpsc::channel();
        let link = LinkMonitor::new(DeadRadio, rx);
        let authority = TimeAuthority::new(
            SteppingClock {
                epoch: BUILD_EPOCH,
                step: 1,
            },
            Duration::ZERO,
        );
        let guard = TimeIntegrityGuard::new(MemoryAnchor::default(), BUILD_EPOCH);
        let reporter = TelemetryReporter::new(
            RecordingTransport {
                status: 200,
                posts: Arc::new(AtomicU32::new(0)),
            },
            DeviceIdentity::from_hardware_id(1),
        );
        let mut orchestrator = Orchestrator::new(
            &config,
            link,
            authority,
            guard,
            reporter,
            FixedProbe(0.0),
            NoUpdates,
        );

        let err = orchestrator.boot().unwrap_err();
        assert!(matches!(
            err,
            FatalError::Connectivity(LinkError::ConnectTimeout { attempts: 3 })
        ));
    }

    #[test]
    fn rejected_report_does_not_stop_the_next_cycle() {
        let (mut orchestrator, posts) = orchestrator_with(
            SteppingClock {
                epoch: BUILD_EPOCH,
                step: 1,
            },
            -1,
        );
        orchestrator.boot().unwrap();

        assert!(orchestrator.run_cycle().is_ok());
        assert!(orchestrator.run_cycle().is_ok());
        assert_eq!(posts.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn drift_beyond_tolerance_escalates_to_fatal() {
        // Boot anchors and narrows; the clock then jumps past a month.
        let (mut orchestrator, posts) = orchestrator_with(
            SteppingClock {
                epoch: BUILD_EPOCH,
                step: ONE_MONTH_SECS + 1,
            },
            200,
        );
        orchestrator.boot().unwrap();

        let err = orchestrator.run_cycle().unwrap_err();
        assert!(matches!(err, FatalError::Drift(_)));
        // The bad epoch was never reported.
        assert_eq!(posts.load(Ordering::Relaxed), 0);
    }
}
