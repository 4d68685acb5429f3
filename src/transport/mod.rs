//! Telemetry transport.
//!
//! The pipeline hands each cycle's record to a [`TelemetrySink`]. The MQTT
//! sink is the production path; [`LogSink`] keeps bench runs self-contained.

pub mod mqtt;

use crate::decision::TelemetryRecord;
use crate::error::{PetCareError, Result};

pub use mqtt::{
    build_transport, parse_mqtt_endpoint, MqttEndpoint, MqttSettings, MqttTelemetrySink,
    TlsMaterials, DEFAULT_CLIENT_ID, DEFAULT_TELEMETRY_TOPIC,
};

/// Destination for telemetry records.
pub trait TelemetrySink: Send {
    fn name(&self) -> &'static str;

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()>;
}

/// Writes each record to the log as JSON.
#[derive(Default)]
pub struct LogSink {
    published: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl TelemetrySink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| PetCareError::Publish(format!("failed to encode telemetry: {}", e)))?;
        log::info!("telemetry: {}", payload);
        self.published += 1;
        Ok(())
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        (**self).publish(record)
    }
}
