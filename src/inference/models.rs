use std::path::Path;

use crate::classify::{PRESENCE_INPUT_HEIGHT, PRESENCE_INPUT_WIDTH};
use crate::config::ModelPaths;
use crate::error::Result;

use super::backend::ModelCapability;
use super::backends::StubBackend;
use super::registry::BackendRegistry;

/// Scores for the stub sound model: meow, which resolves to Happy.
const STUB_SOUND_SCORES: [f32; 4] = [0.0, 1.0, 0.0, 0.0];
const STUB_EMBEDDING: [f32; 1] = [0.2];
const STUB_PET_PROBABILITY: [f32; 1] = [0.0];

/// Register one backend per model capability.
///
/// A configured path loads an ONNX model: the sound model takes one frame of
/// `frame_size` samples, the embedding model a whole clip fitted to
/// `embedding_input` samples. An unset path registers a stub that reports a
/// content pet and an empty doorway, for bench runs without models.
pub fn build_registry(
    paths: &ModelPaths,
    frame_size: usize,
    embedding_input: usize,
) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    let presence_shape = [
        1,
        PRESENCE_INPUT_HEIGHT as usize,
        PRESENCE_INPUT_WIDTH as usize,
        3,
    ];

    let models: [(&str, ModelCapability, Option<&Path>, Vec<usize>, &[f32]); 3] = [
        (
            "sound",
            ModelCapability::SoundScores,
            paths.sound.as_deref(),
            vec![frame_size],
            &STUB_SOUND_SCORES,
        ),
        (
            "embedding",
            ModelCapability::Embedding,
            paths.embedding.as_deref(),
            vec![1, embedding_input],
            &STUB_EMBEDDING,
        ),
        (
            "presence",
            ModelCapability::PetPresence,
            paths.presence.as_deref(),
            presence_shape.to_vec(),
            &STUB_PET_PROBABILITY,
        ),
    ];

    for (key, capability, path, shape, stub_output) in models {
        match path {
            Some(path) => register_model(&mut registry, key, capability, path, &shape)?,
            None => {
                log::warn!("no {} model configured, using stub backend", key);
                registry.register_as(
                    key,
                    StubBackend::new(capability).with_fallback(stub_output.to_vec()),
                );
            }
        }
    }

    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_model(
    registry: &mut BackendRegistry,
    key: &str,
    capability: ModelCapability,
    path: &Path,
    shape: &[usize],
) -> Result<()> {
    let backend = super::backends::TractBackend::new(path, capability, shape)?;
    registry.register_as(key, backend);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model(
    _registry: &mut BackendRegistry,
    key: &str,
    _capability: ModelCapability,
    path: &Path,
    _shape: &[usize],
) -> Result<()> {
    Err(crate::error::PetCareError::Config(format!(
        "{} model {} configured but this build lacks the backend-tract feature",
        key,
        path.display()
    )))
}
