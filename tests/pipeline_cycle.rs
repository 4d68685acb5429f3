use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use petcare::audio::{pcm16_bytes, AudioClip, DEFAULT_SAMPLE_RATE};
use petcare::inference::{CallLog, SharedBackend};
use petcare::{
    Action, Camera, CycleContext, CycleIo, CycleReport, Device, DoorState, EmotionLabel,
    EmotionPolicy, FeederSettings, FoodLevelField, ModelCapability, PetCareError, Pipeline,
    PipelineSettings, Position, Result, SensorId, Sensors, SoundLabel, StubBackend,
    TelemetryRecord, TelemetrySink,
};
use petcare::devices::{FixedSensors, LoggingActuator, StaticCamera};

const FRAME: usize = 4;
const BARK: [f32; 4] = [0.9, 0.05, 0.03, 0.02];
const MEOW: [f32; 4] = [0.1, 0.8, 0.05, 0.05];
const GROWL: [f32; 4] = [0.1, 0.1, 0.1, 0.7];

#[derive(Default)]
struct RecordingSink {
    records: Vec<TelemetryRecord>,
    fail: bool,
}

impl TelemetrySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        if self.fail {
            return Err(PetCareError::Publish("broker unreachable".into()));
        }
        self.records.push(record.clone());
        Ok(())
    }
}

/// Food readings served in order; the last one repeats.
struct DrainingSensors {
    food_cm: VecDeque<f32>,
    food_reads: usize,
}

impl DrainingSensors {
    fn new(food_cm: &[f32]) -> Self {
        Self {
            food_cm: food_cm.iter().copied().collect(),
            food_reads: 0,
        }
    }
}

impl Sensors for DrainingSensors {
    fn read_distance(&mut self, sensor: SensorId) -> Result<f32> {
        match sensor {
            SensorId::Door => Ok(60.0),
            SensorId::FoodLevel => {
                self.food_reads += 1;
                let cm = if self.food_cm.len() > 1 {
                    self.food_cm.pop_front()
                } else {
                    self.food_cm.front().copied()
                };
                cm.ok_or_else(|| PetCareError::InvalidReading("no echo".into()))
            }
        }
    }

    fn read_motion(&mut self) -> bool {
        false
    }
}

struct BrokenCamera;

impl Camera for BrokenCamera {
    fn capture(&mut self, label: &str) -> Result<PathBuf> {
        Err(PetCareError::ImageDecode(format!("no camera for {}", label)))
    }
}

struct Bench {
    _dir: tempfile::TempDir,
    camera: StaticCamera,
    snapshot_dir: PathBuf,
    actuator: LoggingActuator,
    sensors: FixedSensors,
    sink: RecordingSink,
}

impl Bench {
    fn new(motion: bool, food_distance_cm: f32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("doorway.png");
        image::RgbImage::from_pixel(32, 24, image::Rgb([120, 90, 60]))
            .save(&image_path)
            .unwrap();
        let snapshot_dir = dir.path().join("snapshots");
        Self {
            camera: StaticCamera::new(&image_path, &snapshot_dir),
            snapshot_dir,
            _dir: dir,
            actuator: LoggingActuator::new(),
            sensors: FixedSensors::new(food_distance_cm, 40.0, motion),
            sink: RecordingSink::default(),
        }
    }

    fn run(
        &mut self,
        pipeline: &mut Pipeline,
        ctx: &mut CycleContext,
        clip: &AudioClip,
    ) -> Result<CycleReport> {
        let mut io = CycleIo {
            camera: &mut self.camera,
            actuator: &mut self.actuator,
            sensors: &mut self.sensors,
            sink: &mut self.sink,
        };
        pipeline.run_cycle(ctx, &mut io, clip)
    }

    fn snapshots(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.snapshot_dir) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        frame_size: FRAME,
        feeder: FeederSettings {
            hold: Duration::ZERO,
            timeout: Duration::ZERO,
            poll: Duration::ZERO,
            ..FeederSettings::default()
        },
        ..PipelineSettings::default()
    }
}

fn shared(backend: StubBackend) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}

fn sound(scores: &[f32]) -> StubBackend {
    StubBackend::new(ModelCapability::SoundScores).with_fallback(scores.to_vec())
}

fn pet(probability: f32) -> StubBackend {
    StubBackend::new(ModelCapability::PetPresence)
        .with_fallback(vec![probability, 1.0 - probability])
}

fn pipeline(sound_backend: StubBackend, presence_backend: StubBackend) -> Pipeline {
    Pipeline::with_backends(
        &settings(),
        shared(sound_backend),
        None,
        shared(presence_backend),
    )
    .unwrap()
}

fn clip(samples: usize) -> AudioClip {
    let pcm: Vec<i16> = (0..samples).map(|i| (i as i16) * 100).collect();
    AudioClip::new(pcm16_bytes(&pcm), DEFAULT_SAMPLE_RATE)
}

fn published(bench: &Bench) -> serde_json::Value {
    assert_eq!(bench.sink.records.len(), 1);
    serde_json::from_slice(&bench.sink.records[0].to_json().unwrap()).unwrap()
}

#[test]
fn bark_without_motion_feeds_and_publishes() {
    let mut bench = Bench::new(false, 12.5);
    let mut pipeline = pipeline(sound(&BARK), pet(0.9));
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert_eq!(report.emotion, EmotionLabel::Hungry);
    assert_eq!(report.sound.as_ref().unwrap().frames, 2);
    assert!(report.decision.actions.contains(Action::Feed));
    assert!(!report.decision.actions.contains(Action::CloseDoor));
    assert!(report.published);
    assert_eq!(
        bench.actuator.history(),
        &[(Device::Feeder, Position::Open), (Device::Feeder, Position::Closed)]
    );
    assert_eq!(
        published(&bench),
        serde_json::json!({
            "sound": "bark",
            "emotion": "Hungry",
            "food_level_cm": 12.5,
            "motion_detected": false,
            "door_state": "open"
        })
    );
    assert!(bench.snapshots().is_empty());
}

#[test]
fn motion_with_pet_closes_door_and_captures_alert() {
    let mut bench = Bench::new(true, 12.5);
    let presence = pet(0.9);
    let presence_calls = presence.call_log();
    let mut pipeline = pipeline(sound(&MEOW), presence);
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert!(report.motion_accepted);
    assert!(report.presence.unwrap().present);
    assert_eq!(report.emotion, EmotionLabel::Happy);
    assert_eq!(report.decision.door_state(), DoorState::Closed);
    assert_eq!(bench.actuator.history(), &[(Device::Door, Position::Closed)]);
    assert_eq!(presence_calls.count(), 1);
    assert_eq!(presence_calls.inputs()[0].len(), 224 * 224 * 3);

    let alert = report.alert_image.unwrap();
    assert!(file_name(&alert).starts_with("alert_"));
    let snapshots = bench.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().any(|name| name.starts_with("motion_")));

    let json = published(&bench);
    assert_eq!(json["door_state"], "closed");
    assert_eq!(json["motion_detected"], true);
}

#[test]
fn motion_at_threshold_leaves_door_alone() {
    let mut bench = Bench::new(true, 12.5);
    let mut pipeline = pipeline(sound(&MEOW), pet(0.5));
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert!(!report.presence.unwrap().present);
    assert_eq!(report.decision.door_state(), DoorState::Open);
    assert!(report.alert_image.is_none());
    assert!(bench.actuator.history().is_empty());
    assert_eq!(published(&bench)["door_state"], "open");
}

#[test]
fn growl_closes_door_without_motion() {
    let mut bench = Bench::new(false, 12.5);
    let mut pipeline = pipeline(sound(&GROWL), pet(0.0));
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert_eq!(report.emotion, EmotionLabel::Angry);
    assert_eq!(report.decision.door_state(), DoorState::Closed);
    assert!(report.alert_image.is_some());
    assert_eq!(bench.actuator.history(), &[(Device::Door, Position::Closed)]);
    let json = published(&bench);
    assert_eq!(json["sound"], "growl");
    assert_eq!(json["emotion"], "Angry");
}

#[test]
fn sound_inference_failure_aborts_before_acting() {
    let mut bench = Bench::new(false, 12.5);
    let failing = StubBackend::new(ModelCapability::SoundScores)
        .with_output(BARK.to_vec())
        .with_failure("model runtime fault");
    let mut pipeline = pipeline(failing, pet(0.9));
    let mut ctx = CycleContext::new();

    let err = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap_err();

    assert!(matches!(err, PetCareError::Inference(_)));
    assert!(bench.sink.records.is_empty());
    assert!(bench.actuator.history().is_empty());
    assert_eq!(ctx.cycles, 1);
}

#[test]
fn presence_inference_failure_aborts_cycle() {
    let mut bench = Bench::new(true, 12.5);
    let presence = StubBackend::new(ModelCapability::PetPresence).with_failure("tensor mismatch");
    let mut pipeline = pipeline(sound(&BARK), presence);
    let mut ctx = CycleContext::new();

    assert!(matches!(
        bench.run(&mut pipeline, &mut ctx, &clip(8)),
        Err(PetCareError::Inference(_))
    ));
    assert!(bench.sink.records.is_empty());
    assert!(bench.actuator.history().is_empty());
}

#[test]
fn undecodable_audio_reports_unknown_and_happy() {
    let mut bench = Bench::new(false, 12.5);
    let sound_backend = sound(&BARK);
    let sound_calls: CallLog = sound_backend.call_log();
    let mut pipeline = pipeline(sound_backend, pet(0.0));
    let mut ctx = CycleContext::new();
    let odd = AudioClip::new(vec![0x01, 0x02, 0x03], DEFAULT_SAMPLE_RATE);

    let report = bench.run(&mut pipeline, &mut ctx, &odd).unwrap();

    assert!(report.sound.is_none());
    assert_eq!(report.emotion, EmotionLabel::Happy);
    assert_eq!(report.decision.telemetry.sound(), SoundLabel::Unknown);
    assert_eq!(sound_calls.count(), 0);
    assert!(!report.notes.is_empty());
    let json = published(&bench);
    assert_eq!(json["sound"], "unknown");
    assert_eq!(json["emotion"], "Happy");
}

#[test]
fn short_clip_falls_back_to_first_label() {
    let mut bench = Bench::new(false, 12.5);
    let sound_backend = sound(&GROWL);
    let sound_calls = sound_backend.call_log();
    let mut pipeline = pipeline(sound_backend, pet(0.0));
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(FRAME - 1)).unwrap();

    assert_eq!(report.decision.telemetry.sound(), SoundLabel::Bark);
    assert_eq!(report.emotion, EmotionLabel::Hungry);
    assert_eq!(sound_calls.count(), 0);
}

#[test]
fn debounced_motion_skips_capture_but_still_publishes() {
    let mut bench = Bench::new(true, 12.5);
    let presence = pet(0.9);
    let presence_calls = presence.call_log();
    let mut pipeline = pipeline(sound(&MEOW), presence);
    let mut ctx = CycleContext::new();

    let first = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();
    let second = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert!(first.motion_accepted);
    assert!(!second.motion_accepted);
    assert!(second.presence.is_none());
    assert_eq!(presence_calls.count(), 1);
    assert_eq!(second.decision.door_state(), DoorState::Open);
    assert_eq!(bench.sink.records.len(), 2);
    assert!(bench.sink.records[1].motion_detected());
    assert_eq!(ctx.cycles, 2);
}

#[test]
fn capture_failure_makes_presence_indeterminate() {
    let mut bench = Bench::new(true, 12.5);
    let presence = pet(0.9);
    let presence_calls = presence.call_log();
    let mut pipeline = pipeline(sound(&MEOW), presence);
    let mut ctx = CycleContext::new();
    let mut camera = BrokenCamera;
    let mut io = CycleIo {
        camera: &mut camera,
        actuator: &mut bench.actuator,
        sensors: &mut bench.sensors,
        sink: &mut bench.sink,
    };

    let report = pipeline.run_cycle(&mut ctx, &mut io, &clip(8)).unwrap();

    assert!(report.motion_accepted);
    assert!(report.presence.is_none());
    assert_eq!(presence_calls.count(), 0);
    assert_eq!(report.decision.door_state(), DoorState::Open);
    assert!(report.notes.iter().any(|note| note.contains("motion capture")));
    assert!(report.published);
}

#[test]
fn publish_failure_is_not_fatal() {
    let mut bench = Bench::new(false, 12.5);
    bench.sink.fail = true;
    let mut pipeline = pipeline(sound(&BARK), pet(0.0));
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();

    assert!(!report.published);
    assert!(report.notes.iter().any(|note| note.starts_with("publish")));
    assert_eq!(bench.actuator.history().len(), 2);
}

#[test]
fn capacity_field_and_invalid_readings() {
    let capacity_settings = PipelineSettings {
        food_field: FoodLevelField::Capacity,
        ..settings()
    };

    let mut bench = Bench::new(false, 15.0);
    let mut pipeline = Pipeline::with_backends(
        &capacity_settings,
        shared(sound(&MEOW)),
        None,
        shared(pet(0.0)),
    )
    .unwrap();
    let mut ctx = CycleContext::new();
    bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();
    let json = published(&bench);
    assert_eq!(json["food_level_capacity"], 50.0);
    assert!(json.get("food_level_cm").is_none());

    let mut bench = Bench::new(false, -3.0);
    bench.run(&mut pipeline, &mut ctx, &clip(8)).unwrap();
    let json = published(&bench);
    assert!(json.get("food_level_capacity").is_none());
    assert!(json.get("food_level_cm").is_none());
}

fn statistical_pipeline(embedding: StubBackend) -> Pipeline {
    let statistical = PipelineSettings {
        emotion_policy: EmotionPolicy::Statistical,
        ..settings()
    };
    Pipeline::with_backends(
        &statistical,
        shared(sound(&MEOW)),
        Some(shared(embedding)),
        shared(pet(0.0)),
    )
    .unwrap()
}

#[test]
fn statistical_policy_embeds_whole_clip_once() {
    let embedding = StubBackend::new(ModelCapability::Embedding).with_output(vec![0.05, 0.4]);
    let embedding_calls = embedding.call_log();
    let mut pipeline = statistical_pipeline(embedding);
    let mut bench = Bench::new(false, 12.5);
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(10)).unwrap();

    // mean 0.225 is above the happy cutoff
    assert_eq!(report.emotion, EmotionLabel::Happy);
    assert_eq!(embedding_calls.count(), 1);
    assert_eq!(embedding_calls.inputs()[0].len(), 10);
    assert_eq!(published(&bench)["sound"], "meow");
}

#[test]
fn statistical_policy_embeds_clip_shorter_than_a_frame() {
    let embedding = StubBackend::new(ModelCapability::Embedding).with_fallback(vec![0.5, 0.5]);
    let embedding_calls = embedding.call_log();
    let mut pipeline = statistical_pipeline(embedding);
    let mut bench = Bench::new(false, 12.5);
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(FRAME - 1)).unwrap();

    assert_eq!(embedding_calls.count(), 1);
    assert_eq!(report.emotion, EmotionLabel::Happy);
    assert!(!report.decision.actions.contains(Action::CloseDoor));
    assert!(bench.actuator.history().is_empty());
    assert!(report.alert_image.is_none());
}

#[test]
fn statistical_policy_on_empty_clip_is_happy_without_inference() {
    let embedding = StubBackend::new(ModelCapability::Embedding).with_fallback(vec![-0.5]);
    let embedding_calls = embedding.call_log();
    let mut pipeline = statistical_pipeline(embedding);
    let mut bench = Bench::new(false, 12.5);
    let mut ctx = CycleContext::new();

    let report = bench.run(&mut pipeline, &mut ctx, &clip(0)).unwrap();

    assert_eq!(embedding_calls.count(), 0);
    assert_eq!(report.emotion, EmotionLabel::Happy);
    assert_eq!(report.decision.door_state(), DoorState::Open);
}

#[test]
fn statistical_policy_empty_embedding_aborts() {
    let mut pipeline = statistical_pipeline(
        StubBackend::new(ModelCapability::Embedding).with_fallback(Vec::new()),
    );
    let mut bench = Bench::new(false, 12.5);
    let mut ctx = CycleContext::new();

    assert!(matches!(
        bench.run(&mut pipeline, &mut ctx, &clip(8)),
        Err(PetCareError::Inference(_))
    ));
    assert!(bench.actuator.history().is_empty());
    assert!(bench.sink.records.is_empty());
}

fn run_feed(
    sensors: &mut DrainingSensors,
    feeder: FeederSettings,
) -> (CycleReport, LoggingActuator) {
    let feed_settings = PipelineSettings {
        feeder,
        ..settings()
    };
    let mut pipeline =
        Pipeline::with_backends(&feed_settings, shared(sound(&BARK)), None, shared(pet(0.0)))
            .unwrap();
    let mut bench = Bench::new(false, 12.5);
    let mut actuator = LoggingActuator::new();
    let mut io = CycleIo {
        camera: &mut bench.camera,
        actuator: &mut actuator,
        sensors,
        sink: &mut bench.sink,
    };
    let report = pipeline
        .run_cycle(&mut CycleContext::new(), &mut io, &clip(8))
        .unwrap();
    (report, actuator)
}

#[test]
fn feeder_stays_open_until_pot_is_full() {
    let mut sensors = DrainingSensors::new(&[12.0, 11.0, 9.5, 8.0, 3.0]);
    let feeder = FeederSettings {
        hold: Duration::ZERO,
        timeout: Duration::from_secs(5),
        poll: Duration::ZERO,
        ..FeederSettings::default()
    };

    let (report, actuator) = run_feed(&mut sensors, feeder);

    assert!(report.decision.actions.contains(Action::Feed));
    // one read for the decision, then 11.0, 9.5 and 8.0 while feeding
    assert_eq!(sensors.food_reads, 4);
    assert_eq!(
        actuator.history(),
        &[(Device::Feeder, Position::Open), (Device::Feeder, Position::Closed)]
    );
    assert!(report.notes.is_empty());
}

#[test]
fn feeder_closes_after_timeout() {
    let mut sensors = DrainingSensors::new(&[12.0]);
    let feeder = FeederSettings {
        hold: Duration::ZERO,
        timeout: Duration::from_millis(20),
        poll: Duration::from_millis(5),
        ..FeederSettings::default()
    };

    let (report, actuator) = run_feed(&mut sensors, feeder);

    assert!(sensors.food_reads > 2);
    assert_eq!(
        actuator.history().last(),
        Some(&(Device::Feeder, Position::Closed))
    );
    assert!(report.notes.iter().any(|note| note.contains("without a full pot")));
}

#[test]
fn feeder_closes_when_food_sensor_goes_quiet() {
    let mut sensors = DrainingSensors::new(&[12.0, f32::NAN]);
    let feeder = FeederSettings {
        hold: Duration::ZERO,
        timeout: Duration::from_secs(5),
        poll: Duration::ZERO,
        ..FeederSettings::default()
    };

    let (report, actuator) = run_feed(&mut sensors, feeder);

    assert_eq!(sensors.food_reads, 2);
    assert_eq!(actuator.history().len(), 2);
    assert!(report.notes.iter().any(|note| note.contains("food sensor")));
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
