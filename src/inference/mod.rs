mod backend;
mod backends;
mod models;
mod registry;

pub use backend::{InferenceBackend, ModelCapability};
pub use backends::{CallLog, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use models::build_registry;
pub use registry::{BackendRegistry, SharedBackend};
