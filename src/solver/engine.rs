//! The contract between the probabilistic compiler and an inference engine.

use super::error::{InferenceError, SamplerDiagnostics};
use crate::compute::Domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An engine the compiler can replay a model against.
///
/// As a `Domain` it builds its own representation of every quantity; priors
/// become the engine's random variables. The compiler then names the
/// outputs it wants back, attaches likelihoods and asks for a trace.
pub trait InferenceEngine: Domain {
    /// Requests `value` in every draw under `key`.
    fn deterministic(&mut self, key: &str, value: &Self::Val);

    /// Attaches a Gaussian likelihood of `data` around `value` with
    /// standard deviation `sigma`.
    fn observe(&mut self, name: &str, value: &Self::Val, data: &[f64], sigma: f64) -> Result<(), InferenceError>;

    /// Runs the sampler. Returns a complete trace or an error, never a
    /// partial trace.
    fn sample(&mut self, request: &SampleRequest, cancel: &CancelToken) -> Result<EngineTrace, InferenceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub draws: usize,
    pub tune: usize,
    pub seed: u64,
    /// Ignore likelihoods and draw from the priors.
    pub prior_only: bool,
    pub initial_scale: f64,
    pub target_acceptance: f64,
}

/// `[draws, width]` row-major samples of one engine variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl EngineArray {
    pub fn row(&self, draw: usize) -> Option<&[f64]> {
        let width = *self.shape.get(1)?;
        self.data.get(draw * width..(draw + 1) * width)
    }
}

/// Engine output: one array per requested variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTrace {
    pub draws: usize,
    pub variables: BTreeMap<String, EngineArray>,
    pub diagnostics: SamplerDiagnostics,
}

/// Shared flag checked by samplers between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}
