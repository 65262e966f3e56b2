//! Re-expresses a flattened model as a forward model for an inference engine.

use super::engine::{CancelToken, EngineTrace, InferenceEngine, SampleRequest};
use super::error::InferenceError;
use super::observation::Observation;
use super::tape::TapeEngine;
use crate::compute::stepper::{self, StepFault};
use crate::compute::trace::{SampleAxis, Trace, TraceBuilder};
use crate::config::InferConfig;
use crate::graph::FlatModel;
use crate::store::{NodeId, Value};
use tracing::{debug, info, instrument};

/// Engine key of a recorded value: `name@t` for series, `name` otherwise.
pub fn output_key(name: &str, t: Option<usize>) -> String {
    match t {
        Some(t) => format!("{}@{}", name, t),
        None => name.to_string(),
    }
}

/// A model replayed into an engine, ready to sample.
pub struct ForwardModel<'m, E> {
    model: &'m FlatModel,
    steps: usize,
    engine: E,
}

/// Runs the time-stepped recurrence against `engine`, requests every
/// Reference's value at every step, and attaches one likelihood per
/// observation.
pub fn compile<'m, E: InferenceEngine>(
    model: &'m FlatModel,
    steps: usize,
    mut engine: E,
    observations: &[Observation],
) -> Result<ForwardModel<'m, E>, InferenceError> {
    let observed: Vec<NodeId> = observations.iter().map(|o| o.resolve(model)).collect::<Result<_, _>>()?;

    let registry = &model.registry;
    let ledger = stepper::run(model, steps, &mut engine).map_err(|StepFault { node, step, fault }| {
        InferenceError::Numeric { name: registry.name(node).to_string(), step, fault }
    })?;

    let mut outputs = 0;
    for id in registry.ids() {
        let name = registry.name(id);
        if registry.kind(id).is_series() {
            for (t, value) in ledger.series(id).iter().enumerate() {
                engine.deterministic(&output_key(name, Some(t)), value);
                outputs += 1;
            }
        } else if let Some(value) = ledger.metric(id).or_else(|| ledger.last(id)) {
            engine.deterministic(&output_key(name, None), value);
            outputs += 1;
        }
    }

    for (obs, &id) in observations.iter().zip(&observed) {
        if let Some(value) = ledger.metric(id) {
            engine.observe(&obs.metric, value, &obs.data, obs.tolerance)?;
        }
    }
    debug!(outputs, observations = observations.len(), steps, "forward model compiled");

    Ok(ForwardModel { model, steps, engine })
}

impl<E: InferenceEngine> ForwardModel<'_, E> {
    /// Samples and rekeys the engine output per Reference, time step and
    /// dimension, the same layout a simulation trace uses.
    pub fn sample(&mut self, request: &SampleRequest, cancel: &CancelToken) -> Result<Trace, InferenceError> {
        let raw = self.engine.sample(request, cancel)?;
        self.to_trace(&raw)
    }

    fn to_trace(&self, raw: &EngineTrace) -> Result<Trace, InferenceError> {
        let registry = &self.model.registry;
        let mut builder = TraceBuilder::new(self.model, self.steps, SampleAxis::Draw);
        let mut missing = None;
        for draw in 0..raw.draws {
            builder.push_sample(|id, t| {
                let key = output_key(registry.name(id), t);
                let row = raw.variables.get(&key).and_then(|a| a.row(draw));
                if row.is_none() && missing.is_none() {
                    missing = Some(key);
                }
                row.map(Value::from)
            });
        }
        if let Some(key) = missing {
            return Err(InferenceError::Engine(format!("engine trace has no values for '{}'", key)));
        }
        Ok(builder.finish((0..raw.draws).collect(), Vec::new()))
    }
}

/// Compiles against the bundled `TapeEngine` and samples.
#[instrument(skip_all, fields(model = %model.name))]
pub fn infer(
    model: &FlatModel,
    observations: &[Observation],
    prior_only: bool,
    config: &InferConfig,
    cancel: &CancelToken,
) -> Result<Trace, InferenceError> {
    infer_with(model, TapeEngine::new(), observations, prior_only, config, cancel)
}

pub fn infer_with<E: InferenceEngine>(
    model: &FlatModel,
    engine: E,
    observations: &[Observation],
    prior_only: bool,
    config: &InferConfig,
    cancel: &CancelToken,
) -> Result<Trace, InferenceError> {
    let steps = config.steps.or(model.steps).unwrap_or(0);
    info!(steps, draws = config.draws, tune = config.tune, seed = config.seed, prior_only, "inference starting");
    let mut forward = compile(model, steps, engine, observations)?;
    let request = SampleRequest {
        draws: config.draws,
        tune: config.tune,
        seed: config.seed,
        prior_only,
        initial_scale: config.initial_scale,
        target_acceptance: config.target_acceptance,
    };
    let trace = forward.sample(&request, cancel)?;
    info!(draws = trace.samples, "inference finished");
    Ok(trace)
}
