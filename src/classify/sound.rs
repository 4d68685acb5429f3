//! Windowed sound classification.
//!
//! A clip is cut into non-overlapping frames of the model's input length,
//! each frame is scored independently, and the per-class scores are averaged
//! before taking the arg-max. A trailing partial frame is dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::Waveform;
use crate::error::{PetCareError, Result};
use crate::inference::InferenceBackend;

/// Input length of the YAMNet-style sound model (0.975 s at 16 kHz).
pub const DEFAULT_FRAME_SIZE: usize = 15_600;

/// Model output index → label.
pub const SOUND_CLASSES: [SoundLabel; 4] = [
    SoundLabel::Bark,
    SoundLabel::Meow,
    SoundLabel::Whine,
    SoundLabel::Growl,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundLabel {
    Bark,
    Meow,
    Whine,
    Growl,
    Unknown,
}

impl SoundLabel {
    /// Map a class index through the fixed table; out-of-table indices are `Unknown`.
    pub fn from_index(index: usize) -> Self {
        SOUND_CLASSES
            .get(index)
            .copied()
            .unwrap_or(SoundLabel::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundLabel::Bark => "bark",
            SoundLabel::Meow => "meow",
            SoundLabel::Whine => "whine",
            SoundLabel::Growl => "growl",
            SoundLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SoundLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one clip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SoundClassification {
    pub label: SoundLabel,
    /// Arg-max index of the aggregate scores (0 when no frame fit).
    pub index: usize,
    /// Number of frames scored.
    pub frames: usize,
    /// Elementwise mean of the per-frame scores; empty when no frame fit.
    pub aggregate: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct SoundClassifier {
    frame_size: usize,
}

impl SoundClassifier {
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(PetCareError::Config(
                "sound frame size must be greater than zero".into(),
            ));
        }
        Ok(Self { frame_size })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Start offsets of every full frame in a signal of `len` samples.
    pub fn frame_offsets(&self, len: usize) -> impl Iterator<Item = usize> {
        let frame_size = self.frame_size;
        (0..len / frame_size).map(move |i| i * frame_size)
    }

    /// Score every full frame and reduce to a single label.
    ///
    /// A clip shorter than one frame yields the first table entry without
    /// calling the backend. The first backend failure aborts the whole
    /// classification.
    pub fn classify(
        &self,
        waveform: &Waveform,
        backend: &mut dyn InferenceBackend,
    ) -> Result<SoundClassification> {
        let samples = waveform.samples();
        let mut sums: Vec<f32> = Vec::new();
        let mut frames = 0usize;

        for start in self.frame_offsets(samples.len()) {
            let frame = &samples[start..start + self.frame_size];
            let scores = backend.infer(frame)?;
            if scores.is_empty() {
                return Err(PetCareError::Inference(format!(
                    "sound model returned no scores for frame at offset {}",
                    start
                )));
            }
            if frames == 0 {
                sums = vec![0.0; scores.len()];
            } else if scores.len() != sums.len() {
                return Err(PetCareError::Inference(format!(
                    "sound model output width changed from {} to {} at offset {}",
                    sums.len(),
                    scores.len(),
                    start
                )));
            }
            for (sum, score) in sums.iter_mut().zip(&scores) {
                *sum += score;
            }
            frames += 1;
            log::debug!("scored frame {} at offset {}", frames, start);
        }

        if frames == 0 {
            log::debug!(
                "clip of {} samples shorter than one frame ({}), using fallback label",
                samples.len(),
                self.frame_size
            );
            return Ok(SoundClassification {
                label: SoundLabel::from_index(0),
                index: 0,
                frames: 0,
                aggregate: Vec::new(),
            });
        }

        let aggregate: Vec<f32> = sums.iter().map(|sum| sum / frames as f32).collect();
        let index = argmax(&aggregate);
        Ok(SoundClassification {
            label: SoundLabel::from_index(index),
            index,
            frames,
            aggregate,
        })
    }
}

impl Default for SoundClassifier {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Index of the largest score; ties go to the lowest index, NaN never wins.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
            best = i;
        }
    }
    best
}
