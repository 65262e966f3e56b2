use crate::store::{NodeId, RefKind, Registry};
use crate::validation::DefinitionError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Evaluation plan for one flattened model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Every non-Stock, non-Metric Reference, dependencies first.
    pub step_order: Vec<NodeId>,
    /// Metrics, dependencies first; evaluated once after the last step.
    pub metric_order: Vec<NodeId>,
}

/// Builds the per-step evaluation order.
///
/// An edge exists where an equation (or flow bound) reads a non-Stock
/// Reference at the current step. Stock reads see the value carried over
/// from the previous step and lagged reads see history, so neither creates
/// an edge; this is what lets stock feedback loops through.
pub fn resolve(registry: &Registry) -> Result<Schedule, DefinitionError> {
    find_cycles(registry)?;

    let step_order = sort(registry, |k| !matches!(k, RefKind::Stock | RefKind::Metric));
    let metric_order = sort(registry, |k| k == RefKind::Metric);
    Ok(Schedule { step_order, metric_order })
}

/// Reports every strongly connected component that forms a cycle, members
/// named in declaration order.
fn find_cycles(registry: &Registry) -> Result<(), DefinitionError> {
    let count = registry.count();
    let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(count, registry.parents_flat.len());
    for id in registry.ids() {
        graph.add_node(id);
    }
    let mut self_loops = vec![false; count];
    for id in registry.ids() {
        for &parent in registry.get_parents(id) {
            if parent == id {
                self_loops[id.index()] = true;
            }
            graph.add_edge(NodeIndex::new(id.index()), NodeIndex::new(parent.index()), ());
        }
    }

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || self_loops[scc[0].index()])
        .map(|scc| {
            let mut members: Vec<NodeId> = scc.into_iter().map(|ix| graph[ix]).collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();

    let errors = cycles
        .into_iter()
        .map(|members| DefinitionError::Cycle {
            names: members.into_iter().map(|id| registry.name(id).to_string()).collect(),
        })
        .collect();
    DefinitionError::collect(errors)
}

/// Depth-first postorder over the selected kinds, visiting roots in
/// declaration order so the result is stable for a fixed graph.
///
/// Assumes `find_cycles` passed.
fn sort(registry: &Registry, include: impl Fn(RefKind) -> bool) -> Vec<NodeId> {
    let count = registry.count();
    let mut order = Vec::with_capacity(count);
    let mut state = vec![VisitState::None; count];

    for id in registry.ids() {
        if include(registry.kind(id)) && state[id.index()] == VisitState::None {
            visit(id, registry, &include, &mut state, &mut order);
        }
    }
    order
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting,
    Visited,
}

fn visit(
    node: NodeId,
    registry: &Registry,
    include: &impl Fn(RefKind) -> bool,
    state: &mut Vec<VisitState>,
    order: &mut Vec<NodeId>,
) {
    let idx = node.index();
    if state[idx] != VisitState::None {
        return;
    }
    state[idx] = VisitState::Visiting;

    for &parent in registry.get_parents(node) {
        if include(registry.kind(parent)) {
            visit(parent, registry, include, state, order);
        }
    }

    state[idx] = VisitState::Visited;
    order.push(node);
}
