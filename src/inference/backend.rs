use crate::error::Result;

/// What a model produces.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelCapability {
    /// Per-class sound scores for one fixed-size audio frame.
    SoundScores,
    /// Embedding vector for a whole clip.
    Embedding,
    /// Pet probability vector for a 224x224 RGB tensor.
    PetPresence,
}

/// Inference backend trait.
///
/// The pipeline treats every model as an opaque `infer(input) -> output`
/// call. Implementations must be stateless with respect to the result: the
/// same input yields the same output. Timeouts and retries belong to the
/// backend, and any failure is reported as `PetCareError::Inference`.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend serves a capability.
    fn supports(&self, capability: ModelCapability) -> bool;

    /// Run the model on a flattened input tensor.
    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>>;

    /// Flattened input length the model was loaded with, if it is fixed.
    fn input_len(&self) -> Option<usize> {
        None
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn supports(&self, capability: ModelCapability) -> bool {
        (**self).supports(capability)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        (**self).infer(input)
    }

    fn input_len(&self) -> Option<usize> {
        (**self).input_len()
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
