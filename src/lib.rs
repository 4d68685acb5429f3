//! Smart pet care controller.
//!
//! Each decision cycle listens to the pet, looks at the door when the motion
//! sensor fires, reads the food level, and then feeds, closes the door, takes
//! an alert photo, and reports telemetry.
//!
//! # Module Structure
//!
//! - `audio`: clip sources and PCM16 normalization
//! - `inference`: opaque model backends and the capability registry
//! - `classify`: windowed sound classification, pet presence, emotion policies
//! - `capacity`: ultrasonic distance to food capacity
//! - `decision`: evidence to actions and telemetry, free of side effects
//! - `motion`: motion trigger debounce
//! - `devices`: camera, servo and sensor collaborators
//! - `transport`: telemetry sinks (MQTT, log)
//! - `pipeline`: one cycle end to end
//! - `config`: daemon configuration

pub mod audio;
pub mod capacity;
pub mod classify;
pub mod config;
pub mod decision;
pub mod devices;
pub mod error;
pub mod inference;
pub mod motion;
pub mod pipeline;
pub mod transport;

pub use audio::{AudioClip, AudioSource, Waveform};
pub use capacity::CapacityMapper;
pub use classify::{
    EmotionLabel, EmotionPolicy, PresenceClassifier, PresenceDecision, SoundClassification,
    SoundClassifier, SoundLabel,
};
pub use decision::{
    Action, ActionSet, Decision, DecisionEngine, DecisionInput, DoorState, FoodLevelField,
    TelemetryRecord,
};
pub use devices::{Actuator, Camera, Device, Position, SensorId, Sensors};
pub use error::{PetCareError, Result};
pub use inference::{BackendRegistry, InferenceBackend, ModelCapability, StubBackend};
pub use motion::MotionDebounce;
pub use pipeline::{CycleContext, CycleIo, CycleReport, FeederSettings, Pipeline, PipelineSettings};
pub use transport::{LogSink, TelemetrySink};
