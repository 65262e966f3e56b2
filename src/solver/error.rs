use crate::compute::NumericFault;
use crate::validation::DefinitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// State reported by a sampler when it gives up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerDiagnostics {
    pub draws: usize,
    pub tune: usize,
    pub seed: u64,
    /// Accepted fraction of post-tuning proposals.
    pub acceptance_rate: f64,
    pub rejected: usize,
    /// Proposals whose forward model raised a numeric fault.
    pub numeric_failures: usize,
    /// Random-walk step per free element at the end of the run.
    pub final_scales: Vec<f64>,
}

impl fmt::Display for SamplerDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "draws={} tune={} seed={} acceptance={:.3} rejected={} numeric_failures={}",
            self.draws, self.tune, self.seed, self.acceptance_rate, self.rejected, self.numeric_failures
        )
    }
}

/// Failures of the probabilistic pipeline, kept apart from local
/// simulation faults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("malformed observation of '{metric}': {detail}")]
    MalformedObservation { metric: String, detail: String },

    #[error("'{name}' failed at step {step} while compiling: {fault}")]
    Numeric { name: String, step: usize, fault: NumericFault },

    #[error("sampler diverged ({diagnostics})")]
    Divergence { diagnostics: SamplerDiagnostics },

    #[error("sampler did not converge ({diagnostics})")]
    NonConvergence { diagnostics: SamplerDiagnostics },

    #[error("inference cancelled")]
    Cancelled,

    #[error("inference engine error: {0}")]
    Engine(String),
}

impl InferenceError {
    pub fn diagnostics(&self) -> Option<&SamplerDiagnostics> {
        match self {
            InferenceError::Divergence { diagnostics } | InferenceError::NonConvergence { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}
