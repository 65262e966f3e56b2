//! Probabilistic compilation and the bundled inference engine.
pub mod compiler;
pub mod engine;
pub mod error;
pub mod observation;
pub mod sampler;
pub mod tape;

pub use compiler::{compile, infer, infer_with, ForwardModel};
pub use engine::{CancelToken, EngineArray, EngineTrace, InferenceEngine, SampleRequest};
pub use error::{InferenceError, SamplerDiagnostics};
pub use observation::Observation;
pub use tape::TapeEngine;
