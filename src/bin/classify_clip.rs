//! classify_clip - classify one recorded clip and print the result as JSON.
//!
//! Runs the same windowed sound classifier and emotion policies as the
//! daemon, without touching any hardware or the broker.

use std::path::PathBuf;
use std::sync::MutexGuard;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;

use petcare::audio::file::read_wav_clip;
use petcare::classify::{resolve_emotion, DEFAULT_FRAME_SIZE};
use petcare::config::ModelPaths;
use petcare::inference::{build_registry, SharedBackend};
use petcare::{
    EmotionLabel, EmotionPolicy, InferenceBackend, ModelCapability, SoundClassifier, SoundLabel,
};

/// Five seconds at 16 kHz, the daemon's default capture window.
const DEFAULT_EMBEDDING_INPUT: usize = 80_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify a recorded pet sound clip")]
struct Args {
    /// 16-bit PCM WAV file.
    clip: PathBuf,

    /// ONNX sound classification model.
    #[arg(long, env = "PETCARE_SOUND_MODEL")]
    sound_model: Option<PathBuf>,

    /// ONNX embedding model (statistical policy).
    #[arg(long, env = "PETCARE_EMBEDDING_MODEL")]
    embedding_model: Option<PathBuf>,

    /// Emotion policy (table|statistical).
    #[arg(long, env = "PETCARE_EMOTION_POLICY", default_value = "table")]
    policy: String,

    /// Samples per classification frame.
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    frame_size: usize,

    /// Samples the embedding model takes in one call.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_INPUT)]
    embedding_input: usize,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ClipReport {
    clip: String,
    duration_secs: f32,
    frames: usize,
    sound: SoundLabel,
    emotion: EmotionLabel,
    policy: EmotionPolicy,
    scores: Vec<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let policy: EmotionPolicy = args.policy.parse()?;
    let paths = ModelPaths {
        sound: args.sound_model.clone(),
        embedding: args.embedding_model.clone(),
        presence: None,
    };
    let registry = build_registry(&paths, args.frame_size, args.embedding_input)?;
    let classifier = SoundClassifier::new(args.frame_size)?;

    let waveform = read_wav_clip(&args.clip)?.to_waveform()?;
    let sound_backend = registry.backend_for_capability(ModelCapability::SoundScores)?;
    let classification = {
        let mut backend = lock(&sound_backend)?;
        classifier.classify(&waveform, &mut *backend)?
    };

    let emotion = if policy.needs_embedding() {
        let embedding_backend = registry.backend_for_capability(ModelCapability::Embedding)?;
        let mut backend = lock(&embedding_backend)?;
        resolve_emotion(policy, classification.label, &waveform, Some(&mut *backend))?
    } else {
        resolve_emotion(policy, classification.label, &waveform, None)?
    };

    let report = ClipReport {
        clip: args.clip.display().to_string(),
        duration_secs: waveform.duration_secs(),
        frames: classification.frames,
        sound: classification.label,
        emotion,
        policy,
        scores: classification.aggregate,
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}

fn lock(backend: &SharedBackend) -> Result<MutexGuard<'_, dyn InferenceBackend + 'static>> {
    backend
        .lock()
        .map_err(|_| anyhow!("inference backend lock poisoned"))
}
