#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::error::{PetCareError, Result};
use crate::inference::backend::{InferenceBackend, ModelCapability};

/// Tract-based backend for ONNX inference.
///
/// Loads a local model file with a fixed input shape and returns the first
/// output tensor flattened. One instance serves one model; register several
/// instances under distinct keys for the sound, embedding and pet models.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    capability: ModelCapability,
    input_shape: Vec<usize>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        capability: ModelCapability,
        input_shape: &[usize],
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_err = |stage: &str, e: TractError| {
            PetCareError::Config(format!(
                "{} for ONNX model {}: {}",
                stage,
                model_path.display(),
                e
            ))
        };
        let shape: TVec<usize> = input_shape.iter().copied().collect();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err("failed to load", e))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .map_err(|e| load_err("failed to set input fact", e))?
            .into_optimized()
            .map_err(|e| load_err("failed to optimize", e))?
            .into_runnable()
            .map_err(|e| load_err("failed to build runnable", e))?;

        log::info!(
            "loaded ONNX model {} for {:?} (input shape {:?})",
            model_path.display(),
            capability,
            input_shape
        );

        Ok(Self {
            model,
            capability,
            input_shape: input_shape.to_vec(),
        })
    }

    fn expected_len(&self) -> usize {
        self.input_shape.iter().product()
    }

    fn build_input(&self, input: &[f32]) -> Result<Tensor> {
        let expected_len = self.expected_len();
        if input.len() != expected_len {
            return Err(PetCareError::Inference(format!(
                "expected {} input values for shape {:?}, received {}",
                expected_len,
                self.input_shape,
                input.len()
            )));
        }
        Tensor::from_shape(&self.input_shape, input)
            .map_err(|e| PetCareError::Inference(format!("failed to build input tensor: {}", e)))
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: ModelCapability) -> bool {
        capability == self.capability
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let input = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PetCareError::Inference(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| PetCareError::Inference("model produced no outputs".into()))?;
        let values = output.to_array_view::<f32>().map_err(|e| {
            PetCareError::Inference(format!("model output tensor was not f32: {}", e))
        })?;
        Ok(values.iter().copied().collect())
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.expected_len())
    }

    fn warm_up(&mut self) -> Result<()> {
        let zeros = vec![0.0f32; self.expected_len()];
        self.infer(&zeros).map(|_| ())
    }
}
