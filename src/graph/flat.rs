use super::expr::{Expr, RefUse};
use super::model::Model;
use crate::analysis::{self, Schedule};
use crate::store::{Bounds, FreeValue, NodeId, RefKey, RefKind, RefMetadata, Registry, Wire};
use crate::validation::{DefinitionError, Validator};
use std::collections::HashMap;
use tracing::debug;

/// A model tree resolved into a single registry with an evaluation plan.
///
/// Produced by `Model::flatten`; every run (simulation or compilation)
/// starts from one of these.
#[derive(Debug, Clone)]
pub struct FlatModel {
    pub name: String,
    pub doc: Option<String>,
    pub steps: Option<usize>,
    pub registry: Registry,
    pub schedule: Schedule,
}

impl FlatModel {
    pub(crate) fn build(model: &Model) -> Result<Self, DefinitionError> {
        let entries = model.entries();
        let mut registry = Registry::new();
        let mut ids: HashMap<RefKey, NodeId> = HashMap::with_capacity(entries.len());

        let mut errors = Vec::new();
        for (name, key, def) in &entries {
            if let Some(&seen) = ids.get(key) {
                errors.push(DefinitionError::DuplicateReference {
                    name: name.clone(),
                    other: registry.name(seen).to_string(),
                });
                continue;
            }
            let meta = RefMetadata { name: name.clone(), dtype: def.dtype, dim: def.dim, doc: def.doc.clone() };
            ids.insert(*key, registry.add_node(def.kind, meta));
        }
        DefinitionError::collect(errors)?;

        let mut errors = Vec::new();
        for ((name, _, def), id) in entries.iter().zip(registry.ids().collect::<Vec<_>>()) {
            let mut lower = |e: &Option<Expr>| -> Option<Expr<NodeId>> {
                let e = e.as_ref()?;
                match e.map_refs(&mut |k: &RefKey| ids.get(k).copied().ok_or(())) {
                    Ok(mapped) => Some(mapped),
                    Err(()) => {
                        errors.push(DefinitionError::DanglingReference { name: name.clone() });
                        None
                    }
                }
            };
            let idx = id.index();
            registry.equations[idx] = lower(&def.equation);
            registry.bounds[idx] = Bounds { min: lower(&def.min), max: lower(&def.max) };
            registry.priors[idx] = def.prior.clone();
            if def.kind == RefKind::Stock {
                registry.inits[idx] = Some(def.init.clone().unwrap_or_else(FreeValue::default));
            }
        }

        for pending in model.all_wires() {
            match (ids.get(&pending.stock), ids.get(&pending.source)) {
                (Some(&stock), Some(&source)) => registry.wires.push(Wire { stock, source, direction: pending.direction }),
                _ => errors.push(DefinitionError::DanglingReference { name: format!("wiring of {}", pending.stock) }),
            }
        }
        DefinitionError::collect(errors)?;

        let parents = registry.ids().map(|id| same_step_parents(&registry, id)).collect();
        registry.link(parents);

        if let Err(errors) = Validator::new(&registry).validate() {
            DefinitionError::collect(errors)?;
        }
        let schedule = analysis::resolve(&registry)?;
        debug!(model = %model.name(), nodes = registry.count(), wires = registry.wires.len(), "model flattened");

        Ok(FlatModel {
            name: model.name().to_string(),
            doc: model.doc().map(str::to_string),
            steps: model.steps(),
            registry,
            schedule,
        })
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> { self.registry.id_of(name) }
}

/// Non-Stock References an equation or bound reads at the current step.
fn same_step_parents(registry: &Registry, id: NodeId) -> Vec<NodeId> {
    let mut parents = Vec::new();
    for expr in registry.expressions(id) {
        expr.visit_refs(&mut |&target, usage| {
            if usage == RefUse::Current && registry.kind(target) != RefKind::Stock && !parents.contains(&target) {
                parents.push(target);
            }
        });
    }
    parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Reference;

    #[test]
    fn flattening_qualifies_names_and_links() {
        let mut inner = Model::new("inner");
        let rate = inner.add("rate", Reference::variable(2.0)).unwrap();
        let mut root = Model::new("root").with_steps(4);
        root.add_model("inner", inner).unwrap();
        let level = root.add("level", Reference::stock()).unwrap();
        let fill = root.add("fill", Reference::flow_eq(rate.expr().mul(level))).unwrap();
        root.inflow(level, fill).unwrap();

        let flat = root.flatten().unwrap();
        let rate_id = flat.id_of("inner.rate").unwrap();
        let fill_id = flat.id_of("fill").unwrap();
        assert_eq!(flat.steps, Some(4));
        // stock reads carry no same-step edge
        assert_eq!(flat.registry.get_parents(fill_id), &[rate_id]);
        assert_eq!(flat.schedule.step_order, vec![rate_id, fill_id]);
        assert_eq!(flat.registry.wires.len(), 1);
    }

    #[test]
    fn foreign_handle_is_dangling() {
        let mut other = Model::new("other");
        let stranger = other.add("x", Reference::variable(1.0)).unwrap();
        let mut m = Model::new("m");
        m.add("y", Reference::variable(stranger.expr().add(1.0))).unwrap();
        assert!(matches!(m.flatten(), Err(DefinitionError::DanglingReference { ref name }) if name == "y"));
    }

    #[test]
    fn cloned_submodel_is_a_duplicate() {
        let mut part = Model::new("part");
        part.add("x", Reference::variable(1.0)).unwrap();
        let mut m = Model::new("m");
        m.add_model("a", part.clone()).unwrap();
        m.add_model("b", part).unwrap();
        let err = m.flatten().unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateReference { name: "b.x".into(), other: "a.x".into() });
    }

    #[test]
    fn lagged_self_reference_is_not_a_cycle() {
        let mut m = Model::new("m");
        let x = m.add("x", Reference::unbound_variable()).unwrap();
        m.bind(x, x.delay(1, 1.0).mul(2.0)).unwrap();
        assert!(m.flatten().is_ok());
    }
}
