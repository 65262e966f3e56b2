use super::eval::Numeric;
use super::ledger::{Ledger, RuntimeError, SimulationError};
use super::stepper::{self, StepFault};
use super::trace::{SampleAxis, SkippedRepetition, Trace, TraceBuilder};
use crate::config::{repetition_seed, FailurePolicy, RunConfig};
use crate::graph::FlatModel;
use crate::store::Value;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Runs `config.repetitions` independent repetitions of a flattened model.
///
/// Each repetition owns its ledger and its random stream, seeded from
/// `(config.seed, repetition)`, so results do not depend on scheduling. A
/// failed repetition contributes nothing to the trace.
#[instrument(skip_all, fields(model = %model.name))]
pub fn simulate(model: &FlatModel, config: &RunConfig) -> Result<Trace, SimulationError> {
    let steps = config.steps.or(model.steps).unwrap_or(0);
    info!(steps, repetitions = config.repetitions, seed = config.seed, "simulation starting");
    debug!(
        nodes = model.registry.count(),
        step_order = model.schedule.step_order.len(),
        metrics = model.schedule.metric_order.len(),
        "schedule resolved"
    );

    let run_one = |rep: usize| -> Result<Ledger<Value>, RuntimeError> {
        let mut domain = Numeric::new(repetition_seed(config.seed, rep));
        stepper::run(model, steps, &mut domain).map_err(|StepFault { node, step, fault }| RuntimeError {
            name: model.registry.name(node).to_string(),
            step,
            repetition: rep,
            fault,
        })
    };

    // Collected in repetition order either way.
    let results: Vec<Result<Ledger<Value>, RuntimeError>> = if config.parallel && config.repetitions > 1 {
        (0..config.repetitions).into_par_iter().map(run_one).collect()
    } else {
        (0..config.repetitions).map(run_one).collect()
    };

    let mut builder = TraceBuilder::new(model, steps, SampleAxis::Repetition);
    let mut kept = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (rep, result) in results.into_iter().enumerate() {
        match result {
            Ok(ledger) => {
                builder.push_sample(|id, t| match t {
                    Some(t) => ledger.at(id, t).cloned(),
                    None => ledger.metric(id).or_else(|| ledger.last(id)).cloned(),
                });
                kept.push(rep);
            }
            Err(err) => match config.failure_policy {
                FailurePolicy::Abort => return Err(err.into()),
                FailurePolicy::Skip => {
                    warn!(repetition = rep, error = %err, "repetition skipped");
                    failures.push(err);
                }
            },
        }
    }

    if kept.is_empty() && !failures.is_empty() {
        return Err(SimulationError::AllRepetitionsFailed { failures });
    }

    let skipped = failures
        .iter()
        .map(|e| SkippedRepetition { repetition: e.repetition, error: e.to_string() })
        .collect();
    let trace = builder.finish(kept, skipped);
    info!(samples = trace.samples, skipped = trace.skipped.len(), "simulation finished");
    Ok(trace)
}
