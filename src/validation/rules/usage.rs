//! Validation rules for where References and operators may appear.

use crate::graph::RefUse;
use crate::store::{NodeId, RefKind, Registry};
use crate::validation::error::DefinitionError;

/// Flows, Metrics and prior-less Variables need an equation.
pub(crate) fn validate_equation_present(registry: &Registry, id: NodeId) -> Option<DefinitionError> {
    let idx = id.index();
    let needs_equation = match registry.kind(id) {
        RefKind::Flow | RefKind::Metric | RefKind::Scalar => true,
        RefKind::Variable => registry.priors[idx].is_none(),
        RefKind::Stock | RefKind::TimeRef => false,
    };
    if needs_equation && registry.equations[idx].is_none() {
        return Some(DefinitionError::MissingEquation { name: registry.name(id).to_string(), kind: registry.kind(id) });
    }
    None
}

/// Series operators belong to Metrics; Metrics are never read inside a step.
pub(crate) fn validate_usage(registry: &Registry, id: NodeId) -> Vec<DefinitionError> {
    let mut errors = Vec::new();
    if registry.kind(id) == RefKind::Metric {
        return errors;
    }
    let name = registry.name(id);
    let mut uses_series = false;
    let mut metrics_read = Vec::new();
    for expr in registry.expressions(id) {
        expr.visit_refs(&mut |target, usage| {
            uses_series |= usage == RefUse::Series;
            if registry.kind(*target) == RefKind::Metric && !metrics_read.contains(target) {
                metrics_read.push(*target);
            }
        });
    }
    if uses_series {
        errors.push(DefinitionError::SeriesOperatorOutsideMetric { name: name.to_string() });
    }
    for metric in metrics_read {
        errors.push(DefinitionError::MetricInStepEquation {
            name: name.to_string(),
            metric: registry.name(metric).to_string(),
        });
    }
    errors
}
