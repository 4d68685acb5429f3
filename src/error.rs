use thiserror::Error;

pub type Result<T> = std::result::Result<T, PetCareError>;

/// Failures a single decision cycle can run into.
///
/// Expected "nothing found" outcomes (no pet in frame, clip shorter than one
/// frame) are ordinary values and never show up here.
#[derive(Error, Debug)]
pub enum PetCareError {
    /// Raw audio buffer could not be interpreted as PCM16.
    #[error("audio decode error: {0}")]
    Decode(String),

    /// Model invocation failed (missing model, shape mismatch, runtime fault).
    #[error("inference error: {0}")]
    Inference(String),

    /// Snapshot could not be captured, loaded, or resized.
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Sensor reading was negative or non-finite.
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PetCareError {
    /// True for failures that must abort the whole cycle before anything is
    /// actuated or published.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, PetCareError::Inference(_))
    }
}
