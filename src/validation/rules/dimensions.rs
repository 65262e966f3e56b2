//! Validation rule for dimension compatibility.

use crate::graph::Expr;
use crate::store::{broadcast_len, FlowDirection, FreeValue, NodeId, RefKind, Registry};
use crate::validation::error::DefinitionError;

/// Result length of `expr`, or the first pair of incompatible operand lengths.
pub(crate) fn infer_dim(expr: &Expr<NodeId>, registry: &Registry) -> Result<usize, (usize, usize)> {
    let dim_of = |id: &NodeId| registry.meta[id.index()].dim;
    let join = |a: usize, b: usize| broadcast_len(a, b).ok_or((a, b));
    match expr {
        Expr::Const { value } => Ok(value.len()),
        Expr::Ref { target } => Ok(dim_of(target)),
        Expr::Binary { lhs, rhs, .. } => join(infer_dim(lhs, registry)?, infer_dim(rhs, registry)?),
        Expr::Unary { arg, .. } => infer_dim(arg, registry),
        Expr::Piecewise { branches, conditions } => {
            let mut dim = 1;
            for e in branches.iter().chain(conditions.iter()) {
                dim = join(dim, infer_dim(e, registry)?)?;
            }
            Ok(dim)
        }
        Expr::Interpolate { x, .. } => infer_dim(x, registry),
        Expr::Pulse { start, interval } => join(infer_dim(start, registry)?, infer_dim(interval, registry)?),
        Expr::Delay { of, default, .. } => join(dim_of(of), infer_dim(default, registry)?),
        Expr::Reduce { arg, .. } => infer_dim(arg, registry).map(|_| 1),
        Expr::SeriesIndex { of, .. } | Expr::SeriesReduce { of, .. } => Ok(dim_of(of)),
    }
}

/// Equations, bounds, inits and flows must be broadcast-compatible with the
/// dimension declared on their Reference.
pub(crate) fn validate_dimensions(registry: &Registry, id: NodeId) -> Vec<DefinitionError> {
    let meta = &registry.meta[id.index()];
    let declared = meta.dim;
    let mut errors = Vec::new();
    let mismatch = |found: usize| DefinitionError::DimensionMismatch { name: meta.name.clone(), declared, found };

    if declared == 0 {
        errors.push(mismatch(0));
        return errors;
    }

    for expr in registry.expressions(id) {
        match infer_dim(expr, registry) {
            Ok(found) if found == declared || found == 1 => {}
            Ok(found) => errors.push(mismatch(found)),
            Err((_, found)) => errors.push(mismatch(found)),
        }
    }

    if let Some(FreeValue::Fixed(value)) = &registry.inits[id.index()] {
        if value.len() != declared && value.len() != 1 {
            errors.push(mismatch(value.len()));
        }
    }

    if registry.kind(id) == RefKind::Stock {
        for direction in [FlowDirection::Inflow, FlowDirection::Outflow] {
            for source in registry.sources(id, direction) {
                let found = registry.meta[source.index()].dim;
                if found != declared && found != 1 {
                    errors.push(mismatch(found));
                }
            }
        }
    }
    errors
}
