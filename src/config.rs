use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::classify::EmotionPolicy;
use crate::decision::FoodLevelField;
use crate::pipeline::{FeederSettings, PipelineSettings};

const DEFAULT_AUDIO_SOURCE: &str = "udp://0.0.0.0:5005";
const DEFAULT_CAPTURE_WINDOW_MS: u64 = 5_000;
const DEFAULT_FRAME_SIZE: usize = crate::classify::DEFAULT_FRAME_SIZE;
const DEFAULT_PRESENCE_THRESHOLD: f32 = crate::classify::DEFAULT_PRESENCE_THRESHOLD;
const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_MAX_RANGE_CM: f32 = crate::capacity::DEFAULT_MAX_RANGE_CM;
const DEFAULT_FEED_HOLD_MS: u64 = 2_000;
const DEFAULT_FEED_FULL_CM: f32 = crate::pipeline::DEFAULT_FEED_FULL_CM;
const DEFAULT_FEED_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FEED_POLL_MS: u64 = 500;
const DEFAULT_MQTT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_KEEP_ALIVE_SECS: u64 = 60;
const DEFAULT_CYCLE_SECS: u64 = 5;
const DEFAULT_BENCH_DISTANCE_CM: f32 = 15.0;

#[derive(Debug, Deserialize, Default)]
struct PetCareConfigFile {
    audio: Option<AudioConfigFile>,
    models: Option<ModelConfigFile>,
    vision: Option<VisionConfigFile>,
    emotion: Option<EmotionConfigFile>,
    motion: Option<MotionConfigFile>,
    food: Option<FoodConfigFile>,
    feeder: Option<FeederConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
    mqtt: Option<MqttConfigFile>,
    camera: Option<CameraConfigFile>,
    bench: Option<BenchConfigFile>,
    cycle: Option<CycleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AudioConfigFile {
    source: Option<String>,
    frame_size: Option<usize>,
    capture_window_ms: Option<u64>,
    embedding_input: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    sound: Option<PathBuf>,
    embedding: Option<PathBuf>,
    presence: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct EmotionConfigFile {
    policy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FoodConfigFile {
    max_range_cm: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct FeederConfigFile {
    hold_ms: Option<u64>,
    full_cm: Option<f32>,
    timeout_ms: Option<u64>,
    poll_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    food_level: Option<FoodLevelField>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    tls: Option<bool>,
    ca_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
    keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    program: Option<String>,
    args: Option<Vec<String>>,
    snapshot_dir: Option<PathBuf>,
    static_image: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct BenchConfigFile {
    food_distance_cm: Option<f32>,
    door_distance_cm: Option<f32>,
    motion: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CycleConfigFile {
    interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PetCareConfig {
    pub audio: AudioSettings,
    pub models: ModelPaths,
    pub presence_threshold: f32,
    pub emotion_policy: EmotionPolicy,
    pub debounce: Duration,
    pub max_range_cm: f32,
    pub food_field: FoodLevelField,
    pub feeder: FeederSettings,
    pub mqtt: MqttConfig,
    pub camera: CameraSettings,
    pub bench: BenchSettings,
    pub cycle_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    /// `udp://addr`, `stub://samples`, or a WAV path.
    pub source: String,
    pub frame_size: usize,
    pub capture_window: Duration,
    /// Samples the embedding model takes in one call; clips are padded or
    /// trimmed to this. Defaults to one capture window at 16 kHz.
    pub embedding_input: usize,
}

/// Model files; an unset path means a stub backend serves that capability.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    pub sound: Option<PathBuf>,
    pub embedding: Option<PathBuf>,
    pub presence: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_addr: String,
    pub topic: String,
    pub client_id: String,
    /// ThingsBoard device access token goes here.
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub ca_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub keep_alive: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub program: String,
    pub args: Option<Vec<String>>,
    pub snapshot_dir: PathBuf,
    /// Serve this file for every capture instead of running `program`.
    pub static_image: Option<PathBuf>,
}

/// Readings served by the bench sensors.
#[derive(Debug, Clone)]
pub struct BenchSettings {
    pub food_distance_cm: f32,
    pub door_distance_cm: f32,
    pub motion: bool,
}

impl PetCareConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PETCARE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PetCareConfigFile) -> Result<Self> {
        let audio = file.audio.unwrap_or_default();
        let capture_window_ms = audio.capture_window_ms.unwrap_or(DEFAULT_CAPTURE_WINDOW_MS);
        let audio = AudioSettings {
            source: audio
                .source
                .unwrap_or_else(|| DEFAULT_AUDIO_SOURCE.to_string()),
            frame_size: audio.frame_size.unwrap_or(DEFAULT_FRAME_SIZE),
            capture_window: Duration::from_millis(capture_window_ms),
            embedding_input: audio.embedding_input.unwrap_or_else(|| {
                (capture_window_ms * u64::from(crate::audio::DEFAULT_SAMPLE_RATE) / 1_000)
                    as usize
            }),
        };
        let models = file
            .models
            .map(|models| ModelPaths {
                sound: models.sound,
                embedding: models.embedding,
                presence: models.presence,
            })
            .unwrap_or_default();
        let presence_threshold = file
            .vision
            .and_then(|vision| vision.threshold)
            .unwrap_or(DEFAULT_PRESENCE_THRESHOLD);
        let emotion_policy = match file.emotion.and_then(|emotion| emotion.policy) {
            Some(policy) => parse_policy(&policy)?,
            None => EmotionPolicy::default(),
        };
        let debounce = Duration::from_millis(
            file.motion
                .and_then(|motion| motion.debounce_ms)
                .unwrap_or(DEFAULT_DEBOUNCE_MS),
        );
        let max_range_cm = file
            .food
            .and_then(|food| food.max_range_cm)
            .unwrap_or(DEFAULT_MAX_RANGE_CM);
        let food_field = file
            .telemetry
            .and_then(|telemetry| telemetry.food_level)
            .unwrap_or_default();
        let feeder = file.feeder.unwrap_or_default();
        let feeder = FeederSettings {
            hold: Duration::from_millis(feeder.hold_ms.unwrap_or(DEFAULT_FEED_HOLD_MS)),
            full_cm: feeder.full_cm.unwrap_or(DEFAULT_FEED_FULL_CM),
            timeout: Duration::from_millis(feeder.timeout_ms.unwrap_or(DEFAULT_FEED_TIMEOUT_MS)),
            poll: Duration::from_millis(feeder.poll_ms.unwrap_or(DEFAULT_FEED_POLL_MS)),
        };
        let mqtt = file.mqtt.unwrap_or_default();
        let mqtt = MqttConfig {
            broker_addr: mqtt
                .broker_addr
                .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
            topic: mqtt
                .topic
                .unwrap_or_else(|| crate::transport::DEFAULT_TELEMETRY_TOPIC.to_string()),
            client_id: mqtt
                .client_id
                .unwrap_or_else(|| crate::transport::DEFAULT_CLIENT_ID.to_string()),
            username: mqtt.username,
            password: mqtt.password,
            tls: mqtt.tls.unwrap_or(false),
            ca_path: mqtt.ca_path,
            client_cert_path: mqtt.client_cert_path,
            client_key_path: mqtt.client_key_path,
            keep_alive: Duration::from_secs(
                mqtt.keep_alive_secs.unwrap_or(DEFAULT_MQTT_KEEP_ALIVE_SECS),
            ),
        };
        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            program: camera
                .program
                .unwrap_or_else(|| crate::devices::camera::DEFAULT_CAPTURE_PROGRAM.to_string()),
            args: camera.args,
            snapshot_dir: camera
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(crate::devices::camera::DEFAULT_SNAPSHOT_DIR)),
            static_image: camera.static_image,
        };
        let bench = file.bench.unwrap_or_default();
        let bench = BenchSettings {
            food_distance_cm: bench.food_distance_cm.unwrap_or(DEFAULT_BENCH_DISTANCE_CM),
            door_distance_cm: bench.door_distance_cm.unwrap_or(DEFAULT_BENCH_DISTANCE_CM),
            motion: bench.motion.unwrap_or(false),
        };
        let cycle_interval = Duration::from_secs(
            file.cycle
                .and_then(|cycle| cycle.interval_secs)
                .unwrap_or(DEFAULT_CYCLE_SECS),
        );
        Ok(Self {
            audio,
            models,
            presence_threshold,
            emotion_policy,
            debounce,
            max_range_cm,
            food_field,
            feeder,
            mqtt,
            camera,
            bench,
            cycle_interval,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("PETCARE_MQTT_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                self.mqtt.broker_addr = addr;
            }
        }
        if let Ok(topic) = std::env::var("PETCARE_MQTT_TOPIC") {
            if !topic.trim().is_empty() {
                self.mqtt.topic = topic;
            }
        }
        if let Ok(username) = std::env::var("PETCARE_MQTT_USERNAME") {
            if !username.trim().is_empty() {
                self.mqtt.username = Some(username);
            }
        }
        if let Ok(password) = std::env::var("PETCARE_MQTT_PASSWORD") {
            if !password.is_empty() {
                self.mqtt.password = Some(password);
            }
        }
        if let Ok(policy) = std::env::var("PETCARE_EMOTION_POLICY") {
            self.emotion_policy = parse_policy(&policy)?;
        }
        if let Ok(debounce) = std::env::var("PETCARE_DEBOUNCE_MS") {
            let millis: u64 = debounce.parse().map_err(|_| {
                anyhow!("PETCARE_DEBOUNCE_MS must be an integer number of milliseconds")
            })?;
            self.debounce = Duration::from_millis(millis);
        }
        if let Ok(secs) = std::env::var("PETCARE_CYCLE_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow!("PETCARE_CYCLE_SECS must be an integer number of seconds"))?;
            self.cycle_interval = Duration::from_secs(secs);
        }
        if let Ok(source) = std::env::var("PETCARE_AUDIO_SOURCE") {
            if !source.trim().is_empty() {
                self.audio.source = source;
            }
        }
        if let Ok(threshold) = std::env::var("PETCARE_PRESENCE_THRESHOLD") {
            self.presence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("PETCARE_PRESENCE_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.audio.frame_size == 0 {
            return Err(anyhow!("audio.frame_size must be greater than zero"));
        }
        if self.audio.capture_window.is_zero() {
            return Err(anyhow!("audio.capture_window_ms must be greater than zero"));
        }
        if self.audio.embedding_input == 0 {
            return Err(anyhow!("audio.embedding_input must be greater than zero"));
        }
        if !self.presence_threshold.is_finite() {
            return Err(anyhow!("vision.threshold must be a finite number"));
        }
        if !(self.max_range_cm.is_finite() && self.max_range_cm > 0.0) {
            return Err(anyhow!("food.max_range_cm must be a positive number"));
        }
        if !(self.feeder.full_cm.is_finite() && self.feeder.full_cm >= 0.0) {
            return Err(anyhow!("feeder.full_cm must be a non-negative number"));
        }
        if self.cycle_interval.is_zero() {
            return Err(anyhow!("cycle.interval_secs must be greater than zero"));
        }
        if self.mqtt.topic.trim().is_empty() {
            return Err(anyhow!("mqtt.topic must not be empty"));
        }
        if self.mqtt.client_cert_path.is_some() != self.mqtt.client_key_path.is_some() {
            return Err(anyhow!(
                "mqtt.client_cert_path and mqtt.client_key_path must be set together"
            ));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            frame_size: self.audio.frame_size,
            presence_threshold: self.presence_threshold,
            emotion_policy: self.emotion_policy,
            max_range_cm: self.max_range_cm,
            food_field: self.food_field,
            debounce: self.debounce,
            feeder: self.feeder,
        }
    }
}

fn parse_policy(value: &str) -> Result<EmotionPolicy> {
    value.parse::<EmotionPolicy>().map_err(|e| anyhow!(e))
}

fn read_config_file(path: &Path) -> Result<PetCareConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
