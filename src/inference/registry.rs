use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{PetCareError, Result};

use super::backend::{InferenceBackend, ModelCapability};

/// Shared handle to a registered backend.
pub type SharedBackend = Arc<Mutex<dyn InferenceBackend>>;

/// Thread-safe registry of inference backends.
///
/// Backends are wrapped in `Mutex` because `InferenceBackend::infer` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend under its own name. The first registered backend becomes the default.
    pub fn register<B: InferenceBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        self.register_as(&name, backend);
    }

    /// Register a backend under an explicit key.
    ///
    /// Useful when several instances of the same backend type serve different models.
    pub fn register_as<B: InferenceBackend + 'static>(&mut self, key: &str, backend: B) {
        if self.default_name.is_none() {
            self.default_name = Some(key.to_string());
        }
        log::debug!("registered inference backend '{}' ({})", key, backend.name());
        self.backends
            .insert(key.to_string(), Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by key.
    pub fn set_default(&mut self, key: &str) -> Result<()> {
        if !self.backends.contains_key(key) {
            return Err(PetCareError::Config(format!(
                "backend '{}' not registered",
                key
            )));
        }
        self.default_name = Some(key.to_string());
        Ok(())
    }

    /// Get backend by key.
    pub fn get(&self, key: &str) -> Option<SharedBackend> {
        self.backends.get(key).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|key| self.get(key))
    }

    /// List registered backend keys, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backends.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Select a backend that serves the requested capability.
    ///
    /// Prefers the default backend, then the remaining backends in key order.
    pub fn backend_for_capability(&self, capability: ModelCapability) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            if supports(&default_backend, capability)? {
                return Ok(default_backend);
            }
        }

        for key in self.list() {
            if let Some(backend) = self.backends.get(&key) {
                if supports(backend, capability)? {
                    return Ok(backend.clone());
                }
            }
        }

        Err(PetCareError::Config(format!(
            "no registered backend supports capability {:?}",
            capability
        )))
    }

    /// Run inference using a backend that serves the requested capability.
    pub fn infer_with_capability(
        &self,
        capability: ModelCapability,
        input: &[f32],
    ) -> Result<Vec<f32>> {
        let backend = self.backend_for_capability(capability)?;
        let mut guard = backend
            .lock()
            .map_err(|_| PetCareError::Inference("backend lock poisoned".into()))?;
        guard.infer(input)
    }

    /// Warm up every registered backend.
    pub fn warm_up_all(&self) -> Result<()> {
        for key in self.list() {
            if let Some(backend) = self.backends.get(&key) {
                let mut guard = backend
                    .lock()
                    .map_err(|_| PetCareError::Inference("backend lock poisoned".into()))?;
                guard.warm_up()?;
                log::info!("warmed up inference backend '{}'", key);
            }
        }
        Ok(())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports(backend: &SharedBackend, capability: ModelCapability) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| PetCareError::Inference("backend lock poisoned".into()))?;
    Ok(guard.supports(capability))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubBackend;

    #[test]
    fn capability_lookup_prefers_default() {
        let mut registry = BackendRegistry::new();
        registry.register_as(
            "sound",
            StubBackend::new(ModelCapability::SoundScores).with_fallback(vec![1.0]),
        );
        registry.register_as(
            "pet",
            StubBackend::new(ModelCapability::PetPresence).with_fallback(vec![0.9]),
        );

        let out = registry
            .infer_with_capability(ModelCapability::PetPresence, &[0.0])
            .unwrap();
        assert_eq!(out, vec![0.9]);

        let out = registry
            .infer_with_capability(ModelCapability::SoundScores, &[0.0])
            .unwrap();
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn missing_capability_is_config_error() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(ModelCapability::SoundScores));
        let err = registry
            .backend_for_capability(ModelCapability::Embedding)
            .err()
            .unwrap();
        assert!(matches!(err, PetCareError::Config(_)));
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = BackendRegistry::new();
        assert!(registry.set_default("nope").is_err());
        registry.register(StubBackend::new(ModelCapability::SoundScores));
        assert!(registry.set_default("stub").is_ok());
        assert_eq!(registry.list(), vec!["stub".to_string()]);
    }
}
