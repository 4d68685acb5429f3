//! Pet presence from a camera snapshot.
//!
//! Snapshots are decoded, converted to RGB, resized to the classifier's fixed
//! input size and scaled to [0, 1] in NHWC order. The first element of the
//! model output is the pet probability; presence requires it to be strictly
//! above the threshold.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;

use crate::error::{PetCareError, Result};
use crate::inference::InferenceBackend;

pub const PRESENCE_INPUT_WIDTH: u32 = 224;
pub const PRESENCE_INPUT_HEIGHT: u32 = 224;
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PresenceDecision {
    pub probability: f32,
    pub present: bool,
}

#[derive(Clone, Debug)]
pub struct PresenceClassifier {
    width: u32,
    height: u32,
    threshold: f32,
}

impl PresenceClassifier {
    pub fn new(threshold: f32) -> Result<Self> {
        if !threshold.is_finite() {
            return Err(PetCareError::Config(format!(
                "presence threshold must be finite, got {}",
                threshold
            )));
        }
        Ok(Self {
            width: PRESENCE_INPUT_WIDTH,
            height: PRESENCE_INPUT_HEIGHT,
            threshold,
        })
    }

    /// Override the model input size.
    pub fn with_input_size(mut self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PetCareError::Config(format!(
                "presence input size must be non-zero, got {}x{}",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        Ok(self)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Tensor shape the backend receives (NHWC).
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    /// Strict greater-than against the threshold.
    pub fn decide(&self, probability: f32) -> bool {
        probability > self.threshold
    }

    /// Resize and scale an image into the model's input tensor.
    pub fn prepare(&self, image: &DynamicImage) -> Vec<f32> {
        let resized = image
            .resize_exact(self.width, self.height, FilterType::CatmullRom)
            .to_rgb8();
        resized
            .as_raw()
            .iter()
            .map(|channel| *channel as f32 / 255.0)
            .collect()
    }

    pub fn classify_image(
        &self,
        image: &DynamicImage,
        backend: &mut dyn InferenceBackend,
    ) -> Result<PresenceDecision> {
        let tensor = self.prepare(image);
        let output = backend.infer(&tensor)?;
        let probability = *output.first().ok_or_else(|| {
            PetCareError::Inference("pet presence model returned an empty output".into())
        })?;
        let present = self.decide(probability);
        log::info!(
            "pet probability {:.2} (threshold {:.2}) -> present={}",
            probability,
            self.threshold,
            present
        );
        Ok(PresenceDecision {
            probability,
            present,
        })
    }

    pub fn classify_path(
        &self,
        path: &Path,
        backend: &mut dyn InferenceBackend,
    ) -> Result<PresenceDecision> {
        let image = load_image(path)?;
        self.classify_image(&image, backend)
    }
}

impl Default for PresenceClassifier {
    fn default() -> Self {
        Self {
            width: PRESENCE_INPUT_WIDTH,
            height: PRESENCE_INPUT_HEIGHT,
            threshold: DEFAULT_PRESENCE_THRESHOLD,
        }
    }
}

/// Decode a snapshot from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| {
        PetCareError::ImageDecode(format!("failed to load {}: {}", path.display(), e))
    })
}
