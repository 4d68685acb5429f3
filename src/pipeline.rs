//! One decision cycle, end to end.
//!
//! A cycle reads the motion sensor, optionally captures and classifies a
//! snapshot, classifies the audio clip, resolves an emotion, reads the food
//! level, asks the decision engine what to do, and carries it out. Cycles run
//! on one thread and never overlap; the only state carried between them lives
//! in [`CycleContext`].

use std::path::PathBuf;
use std::sync::MutexGuard;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::audio::AudioClip;
use crate::capacity::CapacityMapper;
use crate::capacity::validate_distance;
use crate::classify::{
    resolve_emotion, EmotionLabel, EmotionPolicy, PresenceClassifier, PresenceDecision,
    SoundClassification, SoundClassifier, SoundLabel,
};
use crate::decision::{Action, Decision, DecisionEngine, DecisionInput, FoodLevelField};
use crate::devices::{Actuator, Camera, Device, Position, SensorId, Sensors};
use crate::error::{PetCareError, Result};
use crate::inference::{BackendRegistry, InferenceBackend, ModelCapability, SharedBackend};
use crate::motion::MotionDebounce;
use crate::transport::TelemetrySink;

pub const DEFAULT_FEED_HOLD: Duration = Duration::from_secs(2);
/// Food distance at or below which the pot counts as full.
pub const DEFAULT_FEED_FULL_CM: f32 = 8.0;
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FEED_POLL: Duration = Duration::from_millis(500);

/// Tunables for a [`Pipeline`].
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub frame_size: usize,
    pub presence_threshold: f32,
    pub emotion_policy: EmotionPolicy,
    pub max_range_cm: f32,
    pub food_field: FoodLevelField,
    pub debounce: Duration,
    /// Feeder behaviour for the Feed action.
    pub feeder: FeederSettings,
}

/// Closed-loop feeding: open, hold, then poll the food sensor until the pot
/// reads full or the timeout runs out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeederSettings {
    /// Minimum time the feeder stays open.
    pub hold: Duration,
    pub full_cm: f32,
    /// Upper bound on polling after the hold.
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for FeederSettings {
    fn default() -> Self {
        Self {
            hold: DEFAULT_FEED_HOLD,
            full_cm: DEFAULT_FEED_FULL_CM,
            timeout: DEFAULT_FEED_TIMEOUT,
            poll: DEFAULT_FEED_POLL,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_size: crate::classify::DEFAULT_FRAME_SIZE,
            presence_threshold: crate::classify::DEFAULT_PRESENCE_THRESHOLD,
            emotion_policy: EmotionPolicy::default(),
            max_range_cm: crate::capacity::DEFAULT_MAX_RANGE_CM,
            food_field: FoodLevelField::default(),
            debounce: crate::motion::DEFAULT_DEBOUNCE,
            feeder: FeederSettings::default(),
        }
    }
}

/// State carried from one cycle to the next.
#[derive(Clone, Debug, Default)]
pub struct CycleContext {
    /// When the last motion trigger was accepted.
    pub last_motion: Option<Instant>,
    /// Cycles started, including aborted ones.
    pub cycles: u64,
}

impl CycleContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Collaborators a cycle acts through.
pub struct CycleIo<'a> {
    pub camera: &'a mut dyn Camera,
    pub actuator: &'a mut dyn Actuator,
    pub sensors: &'a mut dyn Sensors,
    pub sink: &'a mut dyn TelemetrySink,
}

/// What happened during one cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub decision: Decision,
    /// `None` when the clip could not be decoded.
    pub sound: Option<SoundClassification>,
    pub emotion: EmotionLabel,
    /// Whether a motion reading passed the debounce window.
    pub motion_accepted: bool,
    /// Snapshot verdict; `None` when nothing was captured or it was indeterminate.
    pub presence: Option<PresenceDecision>,
    pub door_distance_cm: Option<f32>,
    pub alert_image: Option<PathBuf>,
    pub published: bool,
    /// Recoverable failures that degraded this cycle.
    pub notes: Vec<String>,
}

pub struct Pipeline {
    sound: SoundClassifier,
    presence: PresenceClassifier,
    policy: EmotionPolicy,
    engine: DecisionEngine,
    debounce: MotionDebounce,
    feeder: FeederSettings,
    sound_backend: SharedBackend,
    embedding_backend: Option<SharedBackend>,
    presence_backend: SharedBackend,
}

impl Pipeline {
    /// Build a pipeline, resolving one backend per capability it needs.
    ///
    /// The embedding backend is only required by the statistical policy.
    pub fn new(settings: &PipelineSettings, registry: &BackendRegistry) -> Result<Self> {
        let sound_backend = registry.backend_for_capability(ModelCapability::SoundScores)?;
        let presence_backend = registry.backend_for_capability(ModelCapability::PetPresence)?;
        let embedding_backend = if settings.emotion_policy.needs_embedding() {
            Some(registry.backend_for_capability(ModelCapability::Embedding)?)
        } else {
            None
        };
        Self::with_backends(settings, sound_backend, embedding_backend, presence_backend)
    }

    pub fn with_backends(
        settings: &PipelineSettings,
        sound_backend: SharedBackend,
        embedding_backend: Option<SharedBackend>,
        presence_backend: SharedBackend,
    ) -> Result<Self> {
        if settings.emotion_policy.needs_embedding() && embedding_backend.is_none() {
            return Err(PetCareError::Config(
                "statistical emotion policy requires an embedding backend".into(),
            ));
        }
        Ok(Self {
            sound: SoundClassifier::new(settings.frame_size)?,
            presence: PresenceClassifier::new(settings.presence_threshold)?,
            policy: settings.emotion_policy,
            engine: DecisionEngine::new(
                CapacityMapper::new(settings.max_range_cm)?,
                settings.food_field,
            ),
            debounce: MotionDebounce::new(settings.debounce),
            feeder: settings.feeder,
            sound_backend,
            embedding_backend,
            presence_backend,
        })
    }

    pub fn emotion_policy(&self) -> EmotionPolicy {
        self.policy
    }

    /// Run one cycle. An `Err` means the cycle was aborted before anything
    /// was actuated or published.
    pub fn run_cycle(
        &mut self,
        ctx: &mut CycleContext,
        io: &mut CycleIo<'_>,
        clip: &AudioClip,
    ) -> Result<CycleReport> {
        ctx.cycles += 1;
        let cycle = ctx.cycles;
        let mut notes = Vec::new();

        let motion_detected = io.sensors.read_motion();
        let motion_accepted =
            motion_detected && self.debounce.accept(&mut ctx.last_motion, Instant::now());
        if motion_detected && !motion_accepted {
            log::info!(
                "cycle {}: motion within {:?} of the last trigger, skipping capture",
                cycle,
                self.debounce.window()
            );
        }

        let presence = if motion_accepted {
            self.check_presence(io.camera, &mut notes)?
        } else {
            None
        };

        let door_distance_cm = match io.sensors.read_distance(SensorId::Door) {
            Ok(cm) => {
                log::debug!("cycle {}: door distance {:.1} cm", cycle, cm);
                Some(cm)
            }
            Err(e) => {
                notes.push(format!("door sensor: {}", e));
                None
            }
        };

        let (sound, emotion) = self.classify_audio(clip, &mut notes)?;

        let food_distance_cm = match io.sensors.read_distance(SensorId::FoodLevel) {
            Ok(cm) => Some(cm),
            Err(e) => {
                log::warn!("cycle {}: food level unavailable: {}", cycle, e);
                notes.push(format!("food sensor: {}", e));
                None
            }
        };

        let decision = self.engine.decide(&DecisionInput {
            sound: sound.as_ref().map_or(SoundLabel::Unknown, |s| s.label),
            emotion,
            motion_detected,
            presence: presence.map(|p| p.present),
            food_distance_cm,
        });
        log::info!(
            "cycle {}: sound={} emotion={} door={} actions={:?}",
            cycle,
            decision.telemetry.sound(),
            emotion,
            decision.door_state(),
            decision.actions.iter().collect::<Vec<_>>()
        );

        let mut alert_image = None;
        let mut published = false;
        for action in decision.actions.iter() {
            match action {
                Action::Feed => {
                    if let Some(note) = self.feed(io.actuator, io.sensors) {
                        notes.push(note);
                    }
                }
                Action::CloseDoor => io.actuator.actuate(Device::Door, Position::Closed),
                Action::CaptureAlertImage => {
                    match io.camera.capture(&snapshot_label("alert")) {
                        Ok(path) => alert_image = Some(path),
                        Err(e) => {
                            log::warn!("cycle {}: alert capture failed: {}", cycle, e);
                            notes.push(format!("alert capture: {}", e));
                        }
                    }
                }
                Action::Publish => match io.sink.publish(&decision.telemetry) {
                    Ok(()) => published = true,
                    Err(e) => {
                        log::warn!(
                            "cycle {}: telemetry via {} dropped: {}",
                            cycle,
                            io.sink.name(),
                            e
                        );
                        notes.push(format!("publish: {}", e));
                    }
                },
            }
        }

        Ok(CycleReport {
            cycle,
            decision,
            sound,
            emotion,
            motion_accepted,
            presence,
            door_distance_cm,
            alert_image,
            published,
            notes,
        })
    }

    fn check_presence(
        &self,
        camera: &mut dyn Camera,
        notes: &mut Vec<String>,
    ) -> Result<Option<PresenceDecision>> {
        let path = match camera.capture(&snapshot_label("motion")) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("motion snapshot failed, presence indeterminate: {}", e);
                notes.push(format!("motion capture: {}", e));
                return Ok(None);
            }
        };
        let image = match crate::classify::load_image(&path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("presence indeterminate: {}", e);
                notes.push(e.to_string());
                return Ok(None);
            }
        };
        let mut backend = lock(&self.presence_backend)?;
        match self.presence.classify_image(&image, &mut *backend) {
            Ok(decision) => Ok(Some(decision)),
            Err(e) if e.aborts_cycle() => Err(e),
            Err(e) => {
                log::warn!("presence indeterminate: {}", e);
                notes.push(e.to_string());
                Ok(None)
            }
        }
    }

    fn classify_audio(
        &self,
        clip: &AudioClip,
        notes: &mut Vec<String>,
    ) -> Result<(Option<SoundClassification>, EmotionLabel)> {
        let waveform = match clip.to_waveform() {
            Ok(waveform) => waveform,
            Err(e) => {
                log::warn!("audio clip rejected, reporting unknown sound: {}", e);
                notes.push(e.to_string());
                return Ok((None, EmotionLabel::Happy));
            }
        };

        let classification = {
            let mut backend = lock(&self.sound_backend)?;
            self.sound.classify(&waveform, &mut *backend)?
        };

        let emotion = match &self.embedding_backend {
            Some(shared) if self.policy.needs_embedding() => {
                let mut backend = lock(shared)?;
                resolve_emotion(
                    self.policy,
                    classification.label,
                    &waveform,
                    Some(&mut *backend),
                )?
            }
            _ => resolve_emotion(self.policy, classification.label, &waveform, None)?,
        };

        Ok((Some(classification), emotion))
    }

    /// Open the feeder until the pot reads full. Returns a note when feeding
    /// stopped for any other reason.
    fn feed(&self, actuator: &mut dyn Actuator, sensors: &mut dyn Sensors) -> Option<String> {
        log::info!("dispensing food");
        actuator.actuate(Device::Feeder, Position::Open);
        pause(self.feeder.hold);

        let started = Instant::now();
        let note = loop {
            match sensors
                .read_distance(SensorId::FoodLevel)
                .and_then(validate_distance)
            {
                Ok(cm) if cm <= self.feeder.full_cm => {
                    log::info!("food pot full at {:.1} cm", cm);
                    break None;
                }
                Ok(cm) => log::debug!("food at {:.1} cm, still feeding", cm),
                Err(e) => break Some(format!("feeder stopped, food sensor: {}", e)),
            }
            if started.elapsed() >= self.feeder.timeout {
                break Some(format!(
                    "feeder stopped after {:?} without a full pot",
                    self.feeder.timeout
                ));
            }
            pause(self.feeder.poll);
        };
        if let Some(note) = &note {
            log::warn!("{}", note);
        }

        actuator.actuate(Device::Feeder, Position::Closed);
        note
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

fn lock(backend: &SharedBackend) -> Result<MutexGuard<'_, dyn InferenceBackend + 'static>> {
    backend
        .lock()
        .map_err(|_| PetCareError::Inference("backend lock poisoned".into()))
}

/// `<prefix>_<unix seconds>`.
pub fn snapshot_label(prefix: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{}_{}", prefix, secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubBackend;
    use std::sync::{Arc, Mutex};

    fn shared(backend: StubBackend) -> SharedBackend {
        Arc::new(Mutex::new(backend))
    }

    #[test]
    fn statistical_policy_requires_embedding_backend() {
        let settings = PipelineSettings {
            emotion_policy: EmotionPolicy::Statistical,
            ..PipelineSettings::default()
        };
        let result = Pipeline::with_backends(
            &settings,
            shared(StubBackend::new(ModelCapability::SoundScores)),
            None,
            shared(StubBackend::new(ModelCapability::PetPresence)),
        );
        assert!(matches!(result, Err(PetCareError::Config(_))));
    }

    #[test]
    fn registry_resolution_by_capability() {
        let mut registry = BackendRegistry::new();
        registry.register_as("sound", StubBackend::new(ModelCapability::SoundScores));
        registry.register_as("vision", StubBackend::new(ModelCapability::PetPresence));

        let pipeline = Pipeline::new(&PipelineSettings::default(), &registry).unwrap();
        assert_eq!(pipeline.emotion_policy(), EmotionPolicy::Table);

        let settings = PipelineSettings {
            emotion_policy: EmotionPolicy::Statistical,
            ..PipelineSettings::default()
        };
        assert!(Pipeline::new(&settings, &registry).is_err());
    }

    #[test]
    fn snapshot_labels_carry_prefix() {
        let label = snapshot_label("alert");
        let (prefix, secs) = label.split_once('_').unwrap();
        assert_eq!(prefix, "alert");
        assert!(secs.parse::<u64>().unwrap() > 0);
    }
}
