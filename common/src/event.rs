use serde::Serialize;

use crate::identity::DeviceIdentity;

/// Tag carried by every record so the ingest side can route it.
pub const EVENT_TYPE: &str = "iot";

/// One telemetry record. Built fresh each reporting cycle and dropped
/// after the report attempt; never queued.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "eventType")]
    pub event_type: &'static str,
    pub source: String,
    pub metric: String,
    pub value: String,
    pub timestamp: String,
    pub epoch: i64,
}

impl TelemetryEvent {
    pub fn new(
        source: &DeviceIdentity,
        metric: &str,
        value: String,
        timestamp: String,
        epoch: i64,
    ) -> Self {
        Self {
            event_type: EVENT_TYPE,
            source: source.as_str().to_string(),
            metric: metric.to_string(),
            value,
            timestamp,
            epoch,
        }
    }

    /// The ingest endpoint expects a JSON array, one object per event.
    pub fn to_wire_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(&[self])
    }
}
