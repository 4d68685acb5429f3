//! MQTT telemetry transport.
//!
//! Publishes each cycle's telemetry record as JSON with QoS 1. The broker
//! sees an availability topic driven by a retained "online" message and a
//! last-will "offline". ThingsBoard-style brokers authenticate with the
//! device access token as the username and no password.
//!
//! Delivery is best-effort at-least-once. A background thread keeps polling
//! rumqttc's event loop, which reconnects after every failure; publishes
//! queue while the broker is away and fail fast once the queue is full, so a
//! cycle never blocks on the network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};
use rumqttc::{Outgoing, Transport};

use super::TelemetrySink;
use crate::decision::TelemetryRecord;
use crate::error::PetCareError;

pub const DEFAULT_TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const DEFAULT_CLIENT_ID: &str = "petcared";
const AVAILABILITY_TOPIC_SUFFIX: &str = "status";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const REQUEST_QUEUE: usize = 10;
const RECONNECT_BACKOFF_MIN: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host:port`, `[v6]:port`, or a `mqtt://` / `mqtts://` URL.
pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

/// PEM materials for MQTT over TLS.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// CA certificate; `None` trusts the default roots.
    pub ca: Option<Vec<u8>>,
    /// Client certificate and key for mutual TLS.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&PathBuf>,
        client_cert_path: Option<&PathBuf>,
        client_key_path: Option<&PathBuf>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA {}", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert {}",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key {}", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "MQTT TLS client cert and key must be provided together"
                ))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}

pub fn build_transport(endpoint: &MqttEndpoint, tls: &TlsMaterials) -> Result<Transport> {
    if !endpoint.use_tls {
        if tls.is_configured() {
            return Err(anyhow!(
                "MQTT TLS materials provided but TLS is disabled (use mqtts:// or enable tls)"
            ));
        }
        return Ok(Transport::tcp());
    }

    if !tls.is_configured() {
        return Ok(Transport::tls_with_default_config());
    }

    let ca = tls.ca.clone().ok_or_else(|| {
        anyhow!("MQTT TLS CA certificate is required when providing client certificates")
    })?;
    Ok(Transport::tls(ca, tls.client_auth.clone(), None))
}

/// Everything needed to open a telemetry connection.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub keep_alive: Duration,
}

impl MqttSettings {
    /// `<topic>/status`, or `status` for a bare topic.
    pub fn availability_topic(&self) -> String {
        match self.topic.rsplit_once('/') {
            Some((prefix, _)) => format!("{}/{}", prefix, AVAILABILITY_TOPIC_SUFFIX),
            None => AVAILABILITY_TOPIC_SUFFIX.to_string(),
        }
    }
}

struct MqttRuntime {
    client: Client,
    stopping: Arc<AtomicBool>,
    /// Set on every ConnAck after the first; the next publish re-announces
    /// availability since the broker may have fired the last will meanwhile.
    reconnected: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttRuntime {
    fn new(client: Client, connection: Connection, broker: String) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let reconnected = Arc::new(AtomicBool::new(false));
        let handle = {
            let stopping = stopping.clone();
            let reconnected = reconnected.clone();
            std::thread::spawn(move || {
                drive_connection(connection, &broker, &stopping, &reconnected)
            })
        };

        Self {
            client,
            stopping,
            reconnected,
            connection_handle: Some(handle),
        }
    }

    fn disconnect(mut self) -> Result<()> {
        let result = self.client.try_disconnect();
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        result.context("failed to request MQTT disconnect")
    }
}

/// Poll the event loop until a disconnect is sent or shutdown is requested.
/// Errors are logged and retried with capped exponential backoff.
fn drive_connection(
    mut connection: Connection,
    broker: &str,
    stopping: &AtomicBool,
    reconnected: &AtomicBool,
) {
    let mut backoff = RECONNECT_BACKOFF_MIN;
    let mut connected = false;
    let mut sessions = 0u64;

    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                sessions += 1;
                connected = true;
                backoff = RECONNECT_BACKOFF_MIN;
                if sessions == 1 {
                    log::info!("connected to MQTT broker {}", broker);
                } else {
                    log::info!("reconnected to MQTT broker {}", broker);
                    reconnected.store(true, Ordering::SeqCst);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                if connected {
                    log::warn!("lost MQTT connection to {}: {}", broker, e);
                    connected = false;
                } else {
                    log::warn!(
                        "MQTT broker {} unavailable: {} (retrying in {:?})",
                        broker,
                        e,
                        backoff
                    );
                }
                if !sleep_unless_stopping(backoff, stopping) {
                    break;
                }
                backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
            }
        }
    }
    log::debug!("MQTT connection thread for {} finished", broker);
}

/// Sleep for `duration` in short steps. Returns false if shutdown was requested.
fn sleep_unless_stopping(duration: Duration, stopping: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if stopping.load(Ordering::SeqCst) {
            return false;
        }
        std::thread::sleep(STOP_POLL.min(deadline.saturating_duration_since(Instant::now())));
    }
    !stopping.load(Ordering::SeqCst)
}

/// Telemetry sink backed by an MQTT broker.
pub struct MqttTelemetrySink {
    runtime: MqttRuntime,
    topic: String,
    availability_topic: String,
}

impl MqttTelemetrySink {
    /// Start the connection thread and queue the retained "online" message.
    ///
    /// Returns once the client is set up; the broker does not have to be
    /// reachable yet.
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let availability_topic = settings.availability_topic();
        let mut options = MqttOptions::new(
            settings.client_id.as_str(),
            settings.endpoint.host.as_str(),
            settings.endpoint.port,
        );
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        let will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            availability_topic.as_str(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        options.set_transport(build_transport(&settings.endpoint, &settings.tls)?);

        let broker = format!("{}:{}", settings.endpoint.host, settings.endpoint.port);
        log::info!(
            "connecting to MQTT broker {} (TLS: {}, auth: {})",
            broker,
            settings.endpoint.use_tls,
            settings.username.is_some()
        );
        let (client, connection) = Client::new(options, REQUEST_QUEUE);
        let runtime = MqttRuntime::new(client, connection, broker);
        let sink = Self {
            runtime,
            topic: settings.topic.clone(),
            availability_topic,
        };
        sink.announce(PAYLOAD_ONLINE)
            .context("failed to queue availability")?;
        Ok(sink)
    }

    fn announce(&self, payload: &str) -> std::result::Result<(), rumqttc::v5::ClientError> {
        self.runtime.client.try_publish(
            self.availability_topic.as_str(),
            QoS::AtLeastOnce,
            true,
            payload.as_bytes().to_vec(),
        )
    }

    /// Mark the device offline and close the connection.
    pub fn shutdown(self) -> Result<()> {
        if let Err(e) = self.announce(PAYLOAD_OFFLINE) {
            log::warn!("could not queue offline availability: {}", e);
        }
        self.runtime.disconnect()
    }
}

impl TelemetrySink for MqttTelemetrySink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn publish(&mut self, record: &TelemetryRecord) -> crate::error::Result<()> {
        if self.runtime.reconnected.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.announce(PAYLOAD_ONLINE) {
                log::warn!("could not re-announce availability: {}", e);
                self.runtime.reconnected.store(true, Ordering::SeqCst);
            }
        }
        let payload = record
            .to_json()
            .map_err(|e| PetCareError::Publish(format!("failed to encode telemetry: {}", e)))?;
        self.runtime
            .client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| PetCareError::Publish(format!("{}: {}", self.topic, e)))
    }
}
