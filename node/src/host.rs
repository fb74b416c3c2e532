use std::{
    env,
    sync::mpsc::{self, Sender},
    time::Duration,
};

use anyhow::Context;
use tracing::{info, warn};

use telemetry_common::{
    report::API_KEY_HEADER, DeviceIdentity, LinkEvent, LinkMonitor, MemoryAnchor, NoUpdates,
    NodeConfig, Orchestrator, ReportError, ReportTransport, SensorProbe, StationControl,
    SystemClock, TelemetryReporter, TimeAuthority, TimeIntegrityGuard, TransportResponse,
};

/// Stand-in hardware id for host runs without a `HARDWARE_ID` override.
const DEFAULT_HARDWARE_ID: u64 = 0x18FE_34A1_B2C3;

/// Host "radio": the development machine's own network, which is already
/// up, so association resolves instantly through the event channel.
struct LoopbackStation {
    events: Sender<LinkEvent>,
}

impl StationControl for LoopbackStation {
    fn associate(&mut self) {
        let _ = self.events.send(LinkEvent::Connected);
        let _ = self.events.send(LinkEvent::AddressAcquired);
    }

    fn teardown(&mut self) {}
}

// Hardware integration point:
// replace this simulated reading with the LM35 ADC probe on the ESP target.
#[derive(Default)]
struct SimulatedLm35 {
    tick: u64,
}

impl SensorProbe for SimulatedLm35 {
    fn sample(&mut self) -> f32 {
        self.tick = self.tick.saturating_add(1);
        21.5 + ((self.tick % 8) as f32 * 0.25)
    }
}

enum HostTransport {
    Http {
        client: reqwest::blocking::Client,
        url: String,
        api_key: String,
    },
    /// No endpoint configured: log the payload and pretend it landed.
    DryRun,
}

impl ReportTransport for HostTransport {
    fn post(&mut self, body: &str) -> Result<TransportResponse, ReportError> {
        match self {
            Self::Http {
                client,
                url,
                api_key,
            } => {
                let response = client
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .header(API_KEY_HEADER, api_key.as_str())
                    .body(body.to_string())
                    .send()
                    .map_err(|err| ReportError::Transport(err.to_string()))?;
                let status = response.status().as_u16() as i32;
                let body = response.text().unwrap_or_default();
                Ok(TransportResponse { status, body })
            }
            Self::DryRun => {
                info!("dry-run telemetry: {body}");
                Ok(TransportResponse {
                    status: 200,
                    body: "dry-run".to_string(),
                })
            }
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = NodeConfig::default();
    config.ensure_build_defaults();
    apply_env_overrides(&mut config);
    config.sanitize();

    let identity = DeviceIdentity::from_hardware_id(hardware_id());
    info!("host telemetry node starting as {identity}");

    let (events, event_rx) = mpsc::channel();
    let link = LinkMonitor::new(LoopbackStation { events }, event_rx);
    let authority = TimeAuthority::new(
        SystemClock,
        Duration::from_millis(config.time.poll_interval_ms),
    );
    let guard = TimeIntegrityGuard::new(MemoryAnchor::default(), config.time.fallback_epoch);
    let reporter = TelemetryReporter::new(build_transport(&config), identity);

    let mut orchestrator = Orchestrator::new(
        &config,
        link,
        authority,
        guard,
        reporter,
        SimulatedLm35::default(),
        NoUpdates,
    );

    orchestrator.boot().context("boot sequence failed")?;
    info!("entering reporting loop");

    // On hardware a fatal condition restarts the device; on the host the
    // process exits non-zero and the supervisor takes that role.
    let fatal = orchestrator.run();
    Err(anyhow::Error::new(fatal).context("fatal condition, exiting for restart"))
}

fn hardware_id() -> u64 {
    env::var("HARDWARE_ID")
        .ok()
        .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
        .unwrap_or(DEFAULT_HARDWARE_ID)
}

fn apply_env_overrides(config: &mut NodeConfig) {
    if let Ok(endpoint) = env::var("TELEMETRY_ENDPOINT") {
        config.telemetry.endpoint = endpoint;
    }
    if let Ok(api_key) = env::var("TELEMETRY_API_KEY") {
        config.telemetry.api_key = api_key;
    }
    if let Ok(metric) = env::var("TELEMETRY_METRIC") {
        config.telemetry.metric = metric;
    }
    if let Some(interval) = parse_env("REPORT_INTERVAL_MS") {
        config.telemetry.report_interval_ms = interval;
    }
    if let Some(offset) = parse_env("UTC_OFFSET_SECS") {
        config.time.utc_offset_secs = offset;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse::<T>().ok())
}

fn build_transport(config: &NodeConfig) -> HostTransport {
    if config.telemetry.endpoint.is_empty() {
        warn!("TELEMETRY_ENDPOINT not set; reports will be logged only");
        return HostTransport::DryRun;
    }

    let url = if config.telemetry.endpoint.starts_with("http") {
        config.telemetry.endpoint.clone()
    } else {
        format!("https://{}", config.telemetry.endpoint)
    };

    HostTransport::Http {
        client: reqwest::blocking::Client::new(),
        url,
        api_key: config.telemetry.api_key.clone(),
    }
}
