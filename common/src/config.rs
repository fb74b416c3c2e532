use serde::{Deserialize, Serialize};

/// Last-resort build timestamp when the build system did not inject
/// `BUILD_EPOCH` (2026-01-01T00:00:00Z).
const DEFAULT_BUILD_EPOCH: i64 = 1_767_225_600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Ingest endpoint host or full URL; `https://` is assumed when the
    /// scheme is missing.
    pub endpoint: String,
    pub api_key: String,
    pub metric: String,
    pub report_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            metric: "temperature".to_string(),
            report_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    pub servers: Vec<String>,
    pub utc_offset_secs: i32,
    pub poll_interval_ms: u64,
    pub fallback_epoch: i64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                "time1.google.com".to_string(),
                "sg.pool.ntp.org".to_string(),
                "time2.google.com".to_string(),
            ],
            utc_offset_secs: 8 * 60 * 60,
            poll_interval_ms: 100,
            fallback_epoch: build_epoch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 30,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub wifi: WifiConfig,
    pub telemetry: TelemetryConfig,
    pub time: TimeConfig,
    pub link: LinkConfig,
}

impl NodeConfig {
    /// Fill empty credential/endpoint fields from values baked in at
    /// build time.
    pub fn ensure_build_defaults(&mut self) {
        if self.wifi.ssid.is_empty() {
            self.wifi.ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
        }
        if self.wifi.password.is_empty() {
            self.wifi.password = option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string();
        }
        if self.telemetry.endpoint.is_empty() {
            self.telemetry.endpoint = option_env!("TELEMETRY_ENDPOINT")
                .unwrap_or_default()
                .to_string();
        }
        if self.telemetry.api_key.is_empty() {
            self.telemetry.api_key = option_env!("TELEMETRY_API_KEY")
                .unwrap_or_default()
                .to_string();
        }
    }

    pub fn sanitize(&mut self) {
        // FixedOffset rejects offsets of a day or more.
        self.time.utc_offset_secs = self.time.utc_offset_secs.clamp(-86_399, 86_399);
        self.time.poll_interval_ms = self.time.poll_interval_ms.clamp(10, 60_000);
        self.telemetry.report_interval_ms = self.telemetry.report_interval_ms.max(100);
        self.link.connect_attempts = self.link.connect_attempts.max(1);
    }
}

fn build_epoch() -> i64 {
    option_env!("BUILD_EPOCH")
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(DEFAULT_BUILD_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_offset_and_cadence() {
        let mut config = NodeConfig::default();
        config.time.utc_offset_secs = 26 * 60 * 60;
        config.time.poll_interval_ms = 0;
        config.telemetry.report_interval_ms = 0;
        config.link.connect_attempts = 0;

        config.sanitize();

        assert_eq!(config.time.utc_offset_secs, 86_399);
        assert_eq!(config.time.poll_interval_ms, 10);
        assert_eq!(config.telemetry.report_interval_ms, 100);
        assert_eq!(config.link.connect_attempts, 1);
    }

    #[test]
    fn defaults_carry_the_deployed_time_servers() {
        let config = NodeConfig::default();
        assert_eq!(config.time.servers.len(), 3);
        assert_eq!(config.time.utc_offset_secs, 8 * 60 * 60);
        assert!(config.time.fallback_epoch > 0);
    }
}
