pub mod clock;
pub mod config;
pub mod event;
pub mod guard;
pub mod identity;
pub mod link;
pub mod orchestrator;
pub mod report;
pub mod update;

pub use clock::{EpochSource, SystemClock, TimeAuthority, MIN_PLAUSIBLE_EPOCH};
pub use config::{LinkConfig, NodeConfig, TelemetryConfig, TimeConfig, WifiConfig};
pub use event::TelemetryEvent;
pub use guard::{AnchorStore, DriftExceeded, MemoryAnchor, TimeIntegrityGuard};
pub use identity::DeviceIdentity;
pub use link::{ConnectivityState, LinkError, LinkEvent, LinkMonitor, StationControl};
pub use orchestrator::{FatalError, Orchestrator, SensorProbe};
pub use report::{ReportError, ReportTransport, TelemetryReporter, TransportResponse};
pub use update::{NoUpdates, UpdateService};
