use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sound::SoundLabel;
use crate::audio::Waveform;
use crate::error::{PetCareError, Result};
use crate::inference::InferenceBackend;

const HAPPY_MEAN_ABOVE: f32 = 0.1;
const ANGRY_MEAN_BELOW: f32 = -0.1;
const HUNGRY_MAX_ABOVE: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionLabel {
    Happy,
    Hungry,
    Anxious,
    Angry,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Hungry => "Hungry",
            EmotionLabel::Anxious => "Anxious",
            EmotionLabel::Angry => "Angry",
        }
    }

    /// Emotions that warrant shutting the door and snapping an alert image.
    pub fn is_distressed(&self) -> bool {
        matches!(self, EmotionLabel::Angry | EmotionLabel::Anxious)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle turns audio evidence into an emotion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionPolicy {
    /// Fixed sound-label table.
    #[default]
    Table,
    /// Mean/max heuristic over a clip embedding.
    Statistical,
}

impl EmotionPolicy {
    pub fn needs_embedding(&self) -> bool {
        matches!(self, EmotionPolicy::Statistical)
    }
}

impl FromStr for EmotionPolicy {
    type Err = PetCareError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(EmotionPolicy::Table),
            "statistical" | "embedding" => Ok(EmotionPolicy::Statistical),
            other => Err(PetCareError::Config(format!(
                "unknown emotion policy '{}' (expected table|statistical)",
                other
            ))),
        }
    }
}

/// Table policy: bark→Hungry, whine→Anxious, growl→Angry, anything else→Happy.
pub fn emotion_from_sound(label: SoundLabel) -> EmotionLabel {
    match label {
        SoundLabel::Bark => EmotionLabel::Hungry,
        SoundLabel::Whine => EmotionLabel::Anxious,
        SoundLabel::Growl => EmotionLabel::Angry,
        SoundLabel::Meow | SoundLabel::Unknown => EmotionLabel::Happy,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmbeddingSummary {
    pub mean: f32,
    pub max: f32,
}

pub fn summarize(embedding: &[f32]) -> Option<EmbeddingSummary> {
    if embedding.is_empty() {
        return None;
    }
    let mean = embedding.iter().sum::<f32>() / embedding.len() as f32;
    let max = embedding.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Some(EmbeddingSummary { mean, max })
}

/// Statistical policy. Rules are checked in order and the first match wins.
/// An empty embedding carries no evidence and yields `None`.
pub fn emotion_from_embedding(embedding: &[f32]) -> Option<EmotionLabel> {
    let summary = summarize(embedding)?;
    let label = if summary.mean > HAPPY_MEAN_ABOVE {
        EmotionLabel::Happy
    } else if summary.mean < ANGRY_MEAN_BELOW {
        EmotionLabel::Angry
    } else if summary.max > HUNGRY_MAX_ABOVE {
        EmotionLabel::Hungry
    } else {
        EmotionLabel::Anxious
    };
    Some(label)
}

/// Resolve a clip's emotion under `policy`.
///
/// The statistical policy embeds the whole clip in a single call, zero-padded
/// or trimmed to the model's fixed input length when it has one. An empty clip
/// resolves to Happy without touching the model, like an undecodable one.
pub fn resolve_emotion(
    policy: EmotionPolicy,
    sound: SoundLabel,
    waveform: &Waveform,
    embedding_backend: Option<&mut dyn InferenceBackend>,
) -> Result<EmotionLabel> {
    if policy == EmotionPolicy::Table {
        return Ok(emotion_from_sound(sound));
    }
    let backend = embedding_backend.ok_or_else(|| {
        PetCareError::Config("statistical emotion policy requires an embedding backend".into())
    })?;
    if waveform.is_empty() {
        log::info!("empty clip, nothing to embed; reporting Happy");
        return Ok(EmotionLabel::Happy);
    }

    let input = fit_to_len(waveform.samples(), backend.input_len());
    let embedding = backend.infer(&input)?;
    let emotion = emotion_from_embedding(&embedding).ok_or_else(|| {
        PetCareError::Inference("embedding model returned an empty vector".into())
    })?;
    log::debug!(
        "embedded {} samples into {} values -> {}",
        waveform.len(),
        embedding.len(),
        emotion
    );
    Ok(emotion)
}

fn fit_to_len(samples: &[f32], len: Option<usize>) -> Cow<'_, [f32]> {
    match len {
        Some(len) if len != samples.len() => {
            let mut input = samples[..samples.len().min(len)].to_vec();
            input.resize(len, 0.0);
            Cow::Owned(input)
        }
        _ => Cow::Borrowed(samples),
    }
}
