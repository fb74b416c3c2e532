use core::convert::TryInto;
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    gpio::Gpio32,
    modem::Modem,
};
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::prelude::Peripherals,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    netif::IpEvent,
    nvs::EspDefaultNvsPartition,
    sntp::{EspSntp, SntpConf},
    wifi::{EspWifi, WifiEvent},
};
use log::{info, warn};

use telemetry_common::{
    report::API_KEY_HEADER, AnchorStore, DeviceIdentity, LinkEvent, LinkMonitor, NoUpdates,
    NodeConfig, Orchestrator, ReportError, ReportTransport, SensorProbe, StationControl,
    SystemClock, TelemetryReporter, TimeAuthority, TimeConfig, TimeIntegrityGuard,
    TransportResponse, WifiConfig,
};

/// LM35 output on GPIO32 (ADC1 channel 4).
const ADC_VREF_MV: f32 = 3300.0;
const ADC_RESOLUTION: f32 = 2048.0;
const LM35_MV_PER_DEGREE: f32 = 10.0;

const MAX_RESPONSE_BODY: usize = 2048;
const RESTART_GRACE_MS: u64 = 100;

/// Survives soft resets but not power loss; zero means "never anchored".
/// Epoch seconds fit in 32 bits until 2106, which keeps the slot a single
/// word the RTC domain can hold atomically.
#[link_section = ".rtc.data"]
static RTC_REFERENCE_EPOCH: AtomicU32 = AtomicU32::new(0);

struct RtcAnchor;

impl AnchorStore for RtcAnchor {
    fn load(&self) -> Option<i64> {
        let epoch = RTC_REFERENCE_EPOCH.load(Ordering::Relaxed);
        (epoch != 0).then_some(i64::from(epoch))
    }

    fn store(&mut self, epoch: i64) {
        let epoch = u32::try_from(epoch).unwrap_or(0);
        RTC_REFERENCE_EPOCH.store(epoch, Ordering::Relaxed);
    }
}

struct EspStation {
    wifi: EspWifi<'static>,
    ssid: String,
}

impl EspStation {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        config: &WifiConfig,
    ) -> anyhow::Result<Self> {
        let mut wifi = EspWifi::new(modem, sys_loop, Some(nvs_partition))?;

        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;

        wifi.start()?;
        info!("wifi started, station configured for `{}`", config.ssid);

        Ok(Self {
            wifi,
            ssid: config.ssid.clone(),
        })
    }
}

impl StationControl for EspStation {
    fn associate(&mut self) {
        info!("associating with `{}`", self.ssid);
        if let Err(err) = self.wifi.connect() {
            warn!("wifi connect request failed: {err:?}");
        }
    }

    fn teardown(&mut self) {
        if let Err(err) = self.wifi.disconnect() {
            warn!("wifi disconnect failed: {err:?}");
        }
        if let Err(err) = self.wifi.stop() {
            warn!("wifi stop failed: {err:?}");
        }
    }
}

struct Lm35Probe {
    channel: AdcChannelDriver<'static, Gpio32, AdcDriver<'static, ADC1>>,
    last_celsius: f32,
}

impl Lm35Probe {
    fn new(adc1: ADC1, pin: Gpio32) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc1)?;
        let channel_config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, pin, &channel_config)?;

        Ok(Self {
            channel,
            last_celsius: 0.0,
        })
    }
}

impl SensorProbe for Lm35Probe {
    fn sample(&mut self) -> f32 {
        match self.channel.read() {
            Ok(raw) => {
                let millivolts = f32::from(raw) * ADC_VREF_MV / ADC_RESOLUTION;
                self.last_celsius = millivolts / LM35_MV_PER_DEGREE;
                self.last_celsius
            }
            Err(err) => {
                warn!("LM35 ADC read failed: {err:?}");
                self.last_celsius
            }
        }
    }
}

struct EspReportTransport {
    url: String,
    api_key: String,
}

impl EspReportTransport {
    fn new(endpoint: &str, api_key: &str) -> Self {
        let url = if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };

        Self {
            url,
            api_key: api_key.to_string(),
        }
    }
}

impl ReportTransport for EspReportTransport {
    fn post(&mut self, body: &str) -> Result<TransportResponse, ReportError> {
        let http_conf = HttpClientConfiguration {
            timeout: Some(Duration::from_secs(10)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf)
            .map_err(|err| ReportError::Transport(format!("{err:?}")))?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            (API_KEY_HEADER, self.api_key.as_str()),
            ("Content-Length", content_length.as_str()),
        ];

        let mut request = client
            .post(&self.url, &headers)
            .map_err(|err| ReportError::Transport(format!("{err:?}")))?;
        request
            .write_all(body.as_bytes())
            .map_err(|err| ReportError::Transport(format!("{err:?}")))?;

        let mut response = request
            .submit()
            .map_err(|err| ReportError::Transport(format!("{err:?}")))?;
        let status = i32::from(response.status());

        let mut raw = vec![0_u8; MAX_RESPONSE_BODY];
        let mut total = 0_usize;
        while total < raw.len() {
            match response.read(&mut raw[total..]) {
                Ok(0) => break,
                Ok(read) => total += read,
                Err(err) => {
                    warn!("failed reading ingest response body: {err:?}");
                    break;
                }
            }
        }
        raw.truncate(total);
        let body = String::from_utf8_lossy(&raw).into_owned();

        Ok(TransportResponse { status, body })
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = NodeConfig::default();
    config.ensure_build_defaults();
    config.sanitize();

    let identity = DeviceIdentity::from_hardware_id(hardware_id());
    info!("telemetry node starting as {identity}");

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem, pins, adc1, ..
    } = Peripherals::take()?;

    let (event_tx, event_rx) = mpsc::channel();
    let _wifi_events = subscribe_wifi_events(&sys_loop, event_tx.clone())?;
    let _ip_events = subscribe_ip_events(&sys_loop, event_tx)?;

    let station = EspStation::new(modem, sys_loop.clone(), nvs_partition, &config.wifi)
        .context("wifi startup failed")?;
    let link = LinkMonitor::new(station, event_rx);

    let _sntp = start_sntp(&config.time).context("failed to start SNTP")?;
    let authority = TimeAuthority::new(
        SystemClock,
        Duration::from_millis(config.time.poll_interval_ms),
    );
    let guard = TimeIntegrityGuard::new(RtcAnchor, config.time.fallback_epoch);

    let transport = EspReportTransport::new(&config.telemetry.endpoint, &config.telemetry.api_key);
    let reporter = TelemetryReporter::new(transport, identity);

    let probe = Lm35Probe::new(adc1, pins.gpio32).context("failed to initialize LM35 ADC")?;

    let mut orchestrator = Orchestrator::new(
        &config,
        link,
        authority,
        guard,
        reporter,
        probe,
        NoUpdates,
    );

    if let Err(fatal) = orchestrator.boot() {
        restart_device(&format!("boot failed: {fatal}"));
    }
    info!("entering reporting loop");

    let fatal = orchestrator.run();
    restart_device(&fatal.to_string())
}

fn hardware_id() -> u64 {
    let mut mac = [0_u8; 6];
    let rc = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("esp_efuse_mac_get_default failed: esp_err_t={rc}");
    }
    u64::from_le_bytes([mac[0], mac[1], mac[2], mac[3], mac[4], mac[5], 0, 0])
}

fn subscribe_wifi_events(
    sys_loop: &EspSystemEventLoop,
    events: Sender<LinkEvent>,
) -> anyhow::Result<EspSubscription<'static, System>> {
    let subscription = sys_loop.subscribe::<WifiEvent, _>(move |event| match event {
        WifiEvent::StaConnected(_) => {
            let _ = events.send(LinkEvent::Connected);
        }
        WifiEvent::StaDisconnected(_) => {
            let _ = events.send(LinkEvent::Disconnected);
        }
        _ => {}
    })?;
    Ok(subscription)
}

fn subscribe_ip_events(
    sys_loop: &EspSystemEventLoop,
    events: Sender<LinkEvent>,
) -> anyhow::Result<EspSubscription<'static, System>> {
    let subscription = sys_loop.subscribe::<IpEvent, _>(move |event| {
        if let IpEvent::DhcpIpAssigned(_) = event {
            let _ = events.send(LinkEvent::AddressAcquired);
        }
    })?;
    Ok(subscription)
}

fn start_sntp(config: &TimeConfig) -> anyhow::Result<EspSntp<'static>> {
    // SntpConf carries a fixed-size server table; fill as many slots as
    // the build allows and leave the rest at their defaults.
    let mut conf = SntpConf::default();
    for (slot, server) in conf.servers.iter_mut().zip(config.servers.iter()) {
        *slot = server.as_str();
    }

    let sntp = EspSntp::new(&conf)?;
    info!("SNTP started with servers {:?}", config.servers);
    Ok(sntp)
}

fn restart_device(reason: &str) -> ! {
    warn!("{reason}; restarting device");
    thread::sleep(Duration::from_millis(RESTART_GRACE_MS));
    unsafe { esp_idf_svc::sys::esp_restart() }
}
