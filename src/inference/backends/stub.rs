use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{PetCareError, Result};
use crate::inference::backend::{InferenceBackend, ModelCapability};

/// Shared record of every input a `StubBackend` has seen.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Vec<f32>>>>);

impl CallLog {
    pub fn count(&self) -> usize {
        self.0.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn inputs(&self) -> Vec<Vec<f32>> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, input: &[f32]) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(input.to_vec());
        }
    }
}

enum StubResponse {
    Output(Vec<f32>),
    Failure(String),
}

/// Stub backend for testing and bench runs.
///
/// Serves scripted outputs in order, then the fallback output. With neither
/// left it fails like a missing model would.
pub struct StubBackend {
    capabilities: Vec<ModelCapability>,
    script: VecDeque<StubResponse>,
    fallback: Option<Vec<f32>>,
    input_len: Option<usize>,
    calls: CallLog,
}

impl StubBackend {
    pub fn new(capability: ModelCapability) -> Self {
        Self {
            capabilities: vec![capability],
            script: VecDeque::new(),
            fallback: None,
            input_len: None,
            calls: CallLog::default(),
        }
    }

    pub fn with_capability(mut self, capability: ModelCapability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// Queue one output.
    pub fn with_output(mut self, output: Vec<f32>) -> Self {
        self.script.push_back(StubResponse::Output(output));
        self
    }

    /// Queue one failing call.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.script
            .push_back(StubResponse::Failure(message.to_string()));
        self
    }

    /// Output served once the script is exhausted.
    pub fn with_fallback(mut self, output: Vec<f32>) -> Self {
        self.fallback = Some(output);
        self
    }

    /// Advertise a fixed input length, like a loaded model would.
    pub fn with_input_len(mut self, len: usize) -> Self {
        self.input_len = Some(len);
        self
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.calls.record(input);
        match self.script.pop_front() {
            Some(StubResponse::Output(output)) => Ok(output),
            Some(StubResponse::Failure(message)) => Err(PetCareError::Inference(message)),
            None => self.fallback.clone().ok_or_else(|| {
                PetCareError::Inference("stub backend has no scripted output".into())
            }),
        }
    }

    fn input_len(&self) -> Option<usize> {
        self.input_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_serves_script_then_fallback() {
        let mut backend = StubBackend::new(ModelCapability::SoundScores)
            .with_output(vec![1.0, 0.0])
            .with_failure("boom")
            .with_fallback(vec![0.0, 1.0]);
        let log = backend.call_log();

        assert_eq!(backend.infer(&[0.1]).unwrap(), vec![1.0, 0.0]);
        assert!(matches!(
            backend.infer(&[0.2]),
            Err(PetCareError::Inference(_))
        ));
        assert_eq!(backend.infer(&[0.3]).unwrap(), vec![0.0, 1.0]);
        assert_eq!(backend.infer(&[0.4]).unwrap(), vec![0.0, 1.0]);

        assert_eq!(log.count(), 4);
        assert_eq!(log.inputs()[2], vec![0.3]);
    }

    #[test]
    fn empty_stub_fails() {
        let mut backend = StubBackend::new(ModelCapability::Embedding);
        assert!(backend.infer(&[]).is_err());
        assert!(backend.supports(ModelCapability::Embedding));
        assert!(!backend.supports(ModelCapability::PetPresence));
    }
}
