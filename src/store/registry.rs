use super::distribution::Distribution;
use super::types::*;
use crate::graph::Expr;
use std::collections::HashMap;

/// Flow clamp expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<Expr<NodeId>>,
    pub max: Option<Expr<NodeId>>,
}

impl Bounds {
    pub fn is_empty(&self) -> bool { self.min.is_none() && self.max.is_none() }

    pub fn iter(&self) -> impl Iterator<Item = &Expr<NodeId>> {
        self.min.iter().chain(self.max.iter())
    }
}

/// Columnar storage of a flattened model, indexed by `NodeId`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Columnar arrays
    pub kinds: Vec<RefKind>,
    pub meta: Vec<RefMetadata>,
    pub equations: Vec<Option<Expr<NodeId>>>,
    pub bounds: Vec<Bounds>,
    pub priors: Vec<Option<Distribution>>,
    pub inits: Vec<Option<FreeValue>>,

    pub wires: Vec<Wire>,

    // Same-step dependencies (CSR)
    pub parents_flat: Vec<NodeId>,
    pub parents_ranges: Vec<(u32, u32)>,

    pub name_index: HashMap<String, NodeId>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.kinds.len() }

    /// Appends a node. Names are qualified and already unique; callers check.
    pub fn add_node(&mut self, kind: RefKind, meta: RefMetadata) -> NodeId {
        let id = NodeId::new(self.kinds.len());
        self.name_index.insert(meta.name.clone(), id);
        self.kinds.push(kind);
        self.meta.push(meta);
        self.equations.push(None);
        self.bounds.push(Bounds::default());
        self.priors.push(None);
        self.inits.push(None);
        id
    }

    /// Replaces the dependency table. `parents[i]` lists the References node
    /// `i` reads at the current step.
    pub fn link(&mut self, parents: Vec<Vec<NodeId>>) {
        self.parents_flat.clear();
        self.parents_ranges.clear();
        for list in parents {
            let start = self.parents_flat.len() as u32;
            self.parents_ranges.push((start, list.len() as u32));
            self.parents_flat.extend(list);
        }
    }

    #[inline(always)]
    pub fn get_parents(&self, id: NodeId) -> &[NodeId] {
        match self.parents_ranges.get(id.index()) {
            Some(&(start, count)) => &self.parents_flat[start as usize..(start + count) as usize],
            None => &[],
        }
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> { self.name_index.get(name).copied() }

    pub fn name(&self, id: NodeId) -> &str { &self.meta[id.index()].name }

    pub fn kind(&self, id: NodeId) -> RefKind { self.kinds[id.index()] }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ { (0..self.count()).map(NodeId::new) }

    pub fn ids_of_kind(&self, kind: RefKind) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(move |id| self.kind(*id) == kind)
    }

    /// Sources registered on `stock` in `direction`, in registration order.
    pub fn sources(&self, stock: NodeId, direction: FlowDirection) -> impl Iterator<Item = NodeId> + '_ {
        self.wires
            .iter()
            .filter(move |w| w.stock == stock && w.direction == direction)
            .map(|w| w.source)
    }

    /// Every expression attached to a node: equation first, then bounds.
    pub fn expressions(&self, id: NodeId) -> impl Iterator<Item = &Expr<NodeId>> {
        let idx = id.index();
        self.equations[idx].iter().chain(self.bounds[idx].iter())
    }
}
