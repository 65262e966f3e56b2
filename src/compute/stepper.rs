//! The discrete-time recurrence, generic over the evaluation domain.
//!
//! The simulator runs it with `Numeric`; the probabilistic compiler runs the
//! very same code with an inference engine, which is what keeps the two
//! interpretations of a model in lockstep.

use super::eval::{Domain, Evaluator};
use super::ledger::{Ledger, NumericFault};
use crate::graph::{BinaryOp, FlatModel, MathFn};
use crate::store::{Dtype, FlowDirection, FreeValue, NodeId, RefKind};

/// A numeric fault pinned to the node and step that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFault {
    pub node: NodeId,
    pub step: usize,
    pub fault: NumericFault,
}

struct StockPlan {
    id: NodeId,
    inflows: Vec<NodeId>,
    outflows: Vec<NodeId>,
}

/// Runs `steps` steps (`steps + 1` recorded entries per series) and the
/// post-run Metrics.
pub fn run<D: Domain>(model: &FlatModel, steps: usize, domain: &mut D) -> Result<Ledger<D::Val>, StepFault> {
    let registry = &model.registry;
    let mut ledger: Ledger<D::Val> = Ledger::new(registry.count(), steps);

    let stocks: Vec<StockPlan> = registry
        .ids_of_kind(RefKind::Stock)
        .map(|id| StockPlan {
            id,
            inflows: registry.sources(id, FlowDirection::Inflow).collect(),
            outflows: registry.sources(id, FlowDirection::Outflow).collect(),
        })
        .collect();

    // Priors are drawn once per run, before the first step.
    let mut drawn: Vec<Option<D::Val>> = vec![None; registry.count()];
    for id in registry.ids() {
        let idx = id.index();
        let meta = &registry.meta[idx];
        let fault = |fault| StepFault { node: id, step: 0, fault };
        let value = match (&registry.priors[idx], &registry.inits[idx]) {
            (Some(dist), _) => domain.prior(&meta.name, dist, meta.dim).map_err(fault)?,
            (None, Some(FreeValue::Prior(dist))) => {
                domain.prior(&format!("{}.init", meta.name), dist, meta.dim).map_err(fault)?
            }
            (None, Some(FreeValue::Fixed(value))) => domain.constant(value).map_err(fault)?,
            (None, None) => continue,
        };
        drawn[idx] = Some(round_if_int(domain, meta.dtype, value).map_err(fault)?);
    }

    for t in 0..=steps {
        for stock in &stocks {
            let fault = |fault| StepFault { node: stock.id, step: t, fault };
            let value = if t == 0 {
                drawn[stock.id.index()].clone().ok_or(fault(NumericFault::Unbound))?
            } else {
                let prev = |id: NodeId| ledger.at(id, t - 1).ok_or(fault(NumericFault::IndexOutOfRange { index: t as i64 - 1, len: t - 1 }));
                let mut acc = prev(stock.id)?.clone();
                for &f in &stock.inflows {
                    acc = domain.binary(BinaryOp::Add, &acc, prev(f)?).map_err(fault)?;
                }
                for &f in &stock.outflows {
                    acc = domain.binary(BinaryOp::Sub, &acc, prev(f)?).map_err(fault)?;
                }
                round_if_int(domain, registry.meta[stock.id.index()].dtype, acc).map_err(fault)?
            };
            ledger.push(stock.id, value);
        }

        for &id in &model.schedule.step_order {
            let value = step_value(model, &ledger, &drawn, id, t, domain)
                .map_err(|fault| StepFault { node: id, step: t, fault })?;
            ledger.push(id, value);
        }
    }

    for &id in &model.schedule.metric_order {
        let fault = |fault| StepFault { node: id, step: steps, fault };
        let expr = registry.equations[id.index()].as_ref().ok_or(fault(NumericFault::Unbound))?;
        let value = Evaluator::after_run(registry, &ledger, steps).eval(domain, expr).map_err(fault)?;
        let value = round_if_int(domain, registry.meta[id.index()].dtype, value).map_err(fault)?;
        ledger.insert_metric(id, value);
    }

    Ok(ledger)
}

fn step_value<D: Domain>(
    model: &FlatModel,
    ledger: &Ledger<D::Val>,
    drawn: &[Option<D::Val>],
    id: NodeId,
    t: usize,
    domain: &mut D,
) -> Result<D::Val, NumericFault> {
    let registry = &model.registry;
    let idx = id.index();
    if registry.kind(id) == RefKind::TimeRef {
        return domain.constant(&(t as f64).into());
    }
    if let Some(value) = &drawn[idx] {
        return Ok(value.clone());
    }

    let eval = Evaluator::at_step(registry, ledger, t);
    let expr = registry.equations[idx].as_ref().ok_or(NumericFault::Unbound)?;
    let mut value = eval.eval(domain, expr)?;

    let bounds = &registry.bounds[idx];
    if let Some(min) = &bounds.min {
        let lo = eval.eval(domain, min)?;
        value = domain.binary(BinaryOp::Max, &value, &lo)?;
    }
    if let Some(max) = &bounds.max {
        let hi = eval.eval(domain, max)?;
        value = domain.binary(BinaryOp::Min, &value, &hi)?;
    }
    round_if_int(domain, registry.meta[idx].dtype, value)
}

fn round_if_int<D: Domain>(domain: &mut D, dtype: Dtype, value: D::Val) -> Result<D::Val, NumericFault> {
    match dtype {
        Dtype::Float => Ok(value),
        Dtype::Int => domain.unary(MathFn::Round, &value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Schedule;
    use crate::compute::Numeric;
    use crate::store::{RefMetadata, Registry};

    #[test]
    fn unvalidated_node_without_equation_is_unbound() {
        let mut registry = Registry::new();
        let id = registry.add_node(RefKind::Flow, RefMetadata { name: "f".into(), dim: 1, ..Default::default() });
        registry.link(vec![vec![]]);
        let model = FlatModel {
            name: "m".into(),
            doc: None,
            steps: None,
            registry,
            schedule: Schedule { step_order: vec![id], metric_order: vec![] },
        };
        let err = run(&model, 1, &mut Numeric::new(0)).unwrap_err();
        assert_eq!(err, StepFault { node: id, step: 0, fault: NumericFault::Unbound });
    }
}
