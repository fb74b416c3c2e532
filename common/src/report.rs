use core::fmt::Display;

use log::info;
use thiserror::Error;

use crate::{event::TelemetryEvent, identity::DeviceIdentity};

/// Header carrying the ingest API key on every POST.
pub const API_KEY_HEADER: &str = "X-Insert-Key";

/// Outcome of a delivered request. `status` follows the platform HTTP
/// client convention: positive values are HTTP status codes, zero and
/// negative values are transport-level error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: i32,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to encode telemetry event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("telemetry POST failed: {0}")]
    Transport(String),
    #[error("telemetry endpoint signalled failure (status {0})")]
    Rejected(i32),
}

/// Delivery seam. Implementations own the endpoint URL and the fixed
/// `Content-Type` / [`API_KEY_HEADER`] headers.
pub trait ReportTransport {
    fn post(&mut self, body: &str) -> Result<TransportResponse, ReportError>;
}

/// Fire-and-forget reporter: builds one event per cycle and posts it.
/// Failures are returned for the caller to log; there is no retry and a
/// failed cycle never affects the next one.
pub struct TelemetryReporter<T: ReportTransport> {
    transport: T,
    identity: DeviceIdentity,
}

impl<T: ReportTransport> TelemetryReporter<T> {
    pub fn new(transport: T, identity: DeviceIdentity) -> Self {
        Self {
            transport,
            identity,
        }
    }

    pub fn report<V: Display>(
        &mut self,
        metric: &str,
        value: V,
        epoch: i64,
        timestamp: String,
    ) -> Result<TransportResponse, ReportError> {
        let event = TelemetryEvent::new(
            &self.identity,
            metric,
            format!("{value}"),
            timestamp,
            epoch,
        );
        let body = event.to_wire_body()?;
        info!("reporting {body}");

        let response = self.transport.post(&body)?;
        if response.status <= 0 {
            return Err(ReportError::Rejected(response.status));
        }
        Ok(response)
    }
}
