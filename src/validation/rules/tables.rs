//! Validation rules for interpolation tables and piecewise arms.

use crate::graph::Expr;
use crate::store::{NodeId, Registry};
use crate::validation::error::DefinitionError;

fn check_table(xs: &[f64], ys: &[f64]) -> Result<(), String> {
    if xs.is_empty() {
        return Err("table is empty".into());
    }
    if xs.len() != ys.len() {
        return Err(format!("{} x values but {} y values", xs.len(), ys.len()));
    }
    if let Some(bad) = xs.iter().chain(ys).find(|v| !v.is_finite()) {
        return Err(format!("non-finite entry {}", bad));
    }
    if let Some(pair) = xs.windows(2).find(|w| w[0] >= w[1]) {
        return Err(format!("x values must be strictly increasing ({} then {})", pair[0], pair[1]));
    }
    Ok(())
}

pub(crate) fn validate_tables(registry: &Registry, id: NodeId) -> Vec<DefinitionError> {
    let mut errors = Vec::new();
    for expr in registry.expressions(id) {
        expr.visit_tables(&mut |xs, ys| {
            if let Err(detail) = check_table(xs, ys) {
                errors.push(DefinitionError::InvalidTable { name: registry.name(id).to_string(), detail });
            }
        });
    }
    errors
}

/// Every piecewise branch needs exactly one condition.
pub(crate) fn validate_piecewise(registry: &Registry, id: NodeId) -> Vec<DefinitionError> {
    let mut errors = Vec::new();
    for expr in registry.expressions(id) {
        expr.visit_nodes(&mut |node| {
            if let Expr::Piecewise { branches, conditions } = node {
                if branches.len() != conditions.len() {
                    errors.push(DefinitionError::MalformedPiecewise {
                        name: registry.name(id).to_string(),
                        branches: branches.len(),
                        conditions: conditions.len(),
                    });
                }
            }
        });
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RefKind, RefMetadata};
    use rstest::rstest;

    #[rstest]
    #[case(&[0.0, 1.0, 1.0], &[0.0, 1.0, 2.0])]
    #[case(&[2.0, 1.0], &[0.0, 1.0])]
    #[case(&[0.0, 1.0], &[0.0])]
    #[case(&[], &[])]
    fn rejects_malformed_tables(#[case] xs: &[f64], #[case] ys: &[f64]) {
        assert!(check_table(xs, ys).is_err());
    }

    #[test]
    fn accepts_increasing_table() {
        assert!(check_table(&[0.0, 0.5, 2.0], &[1.0, 0.0, 1.0]).is_ok());
    }

    #[test]
    fn piecewise_arms_must_pair_up() {
        let mut reg = Registry::new();
        let id = reg.add_node(RefKind::Variable, RefMetadata { name: "tier".into(), dim: 1, ..Default::default() });
        reg.equations[id.index()] = Some(Expr::Piecewise {
            branches: vec![Expr::constant(1.0), Expr::constant(2.0)],
            conditions: vec![Expr::constant(0.0)],
        });
        assert_eq!(
            validate_piecewise(&reg, id),
            vec![DefinitionError::MalformedPiecewise { name: "tier".into(), branches: 2, conditions: 1 }]
        );
    }
}
