//! Hierarchical model namespace.
//!
//! A `Model` is built in two explicit phases. The structural phase registers
//! References and sub-models by name (`add`, `add_model`) and hands back
//! `Ref` handles. The binding phase attaches equations, bounds, priors and
//! wiring through those handles (`bind`, `set_bounds`, `inflow`, ...), which
//! works across sub-models: a handle obtained from one sub-model can be used
//! in an equation bound on another once both are nested under a common
//! parent.
//!
//! Handles carry a process-unique key, so cloning a model and nesting both
//! copies makes every Reference appear twice; flattening reports that as a
//! `DuplicateReference`.

use super::expr::Expr;
use super::flat::FlatModel;
use super::reference::{Ref, Reference};
use crate::compute::{self, SimulationError, Trace};
use crate::config::{InferConfig, RunConfig};
use crate::solver::{self, CancelToken, InferenceError, Observation};
use crate::store::{
    Distribution, FlowDirection, FreeValue, ItemRecord, ModelRecord, RefKey, RefKind, ReferenceRecord, WireRecord,
};
use crate::validation::DefinitionError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone)]
enum Item {
    Reference { name: String, key: RefKey, def: Reference },
    Model(Model),
}

impl Item {
    fn name(&self) -> &str {
        match self {
            Item::Reference { name, .. } => name,
            Item::Model(m) => &m.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingWire {
    pub stock: RefKey,
    pub source: RefKey,
    pub direction: FlowDirection,
}

#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    doc: Option<String>,
    steps: Option<usize>,
    items: Vec<Item>,
    wires: Vec<PendingWire>,
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{}.{}", prefix, name) }
}

fn check_name(name: &str) -> Result<(), DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidName { name: name.to_string(), reason: reason.to_string() };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => return Err(invalid("must start with a letter or '_'")),
        _ => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only letters, digits and '_' are allowed"));
    }
    Ok(())
}

fn incompatible(name: &str, existing: impl ToString, requested: impl ToString) -> DefinitionError {
    DefinitionError::IncompatibleKind { name: name.to_string(), existing: existing.to_string(), requested: requested.to_string() }
}

/// Kind-specific attributes only make sense on their kind.
fn check_attributes(name: &str, def: &Reference) -> Result<(), DefinitionError> {
    if (def.min.is_some() || def.max.is_some()) && def.kind != RefKind::Flow {
        return Err(incompatible(name, def.kind, "bounded Flow"));
    }
    if def.prior.is_some() && def.kind != RefKind::Variable {
        return Err(incompatible(name, def.kind, "Variable with a prior"));
    }
    if def.init.is_some() && def.kind != RefKind::Stock {
        return Err(incompatible(name, def.kind, "Stock with an init"));
    }
    Ok(())
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), doc: None, steps: None, items: Vec::new(), wires: Vec::new() }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Default step count for runs that do not set one.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn doc(&self) -> Option<&str> { self.doc.as_deref() }
    pub fn steps(&self) -> Option<usize> { self.steps }

    fn position(&self, name: &str) -> Option<usize> { self.items.iter().position(|i| i.name() == name) }

    // ---- structural phase ------------------------------------------------

    /// Registers `reference` under `name`.
    ///
    /// Re-adding an existing name with the same kind replaces the definition
    /// and keeps the handle valid; a different kind is an error.
    pub fn add(&mut self, name: impl Into<String>, reference: Reference) -> Result<Ref, DefinitionError> {
        let name = name.into();
        check_name(&name)?;
        check_attributes(&name, &reference)?;
        let Some(i) = self.position(&name) else {
            let key = RefKey::fresh();
            self.items.push(Item::Reference { name, key, def: reference });
            return Ok(Ref(key));
        };
        match &mut self.items[i] {
            Item::Reference { key, def, .. } => {
                if def.kind != reference.kind {
                    return Err(incompatible(&name, def.kind, reference.kind));
                }
                *def = reference;
                Ok(Ref(*key))
            }
            Item::Model(_) => Err(incompatible(&name, "Model", reference.kind)),
        }
    }

    /// Nests `model` under `name`; its References become `name.<ref>`.
    pub fn add_model(&mut self, name: impl Into<String>, mut model: Model) -> Result<(), DefinitionError> {
        let name = name.into();
        check_name(&name)?;
        model.name = name.clone();
        match self.position(&name) {
            Some(i) => match &self.items[i] {
                Item::Model(_) => {
                    self.items[i] = Item::Model(model);
                    Ok(())
                }
                Item::Reference { def, .. } => Err(incompatible(&name, def.kind, "Model")),
            },
            None => {
                self.items.push(Item::Model(model));
                Ok(())
            }
        }
    }

    pub fn submodel(&self, name: &str) -> Option<&Model> {
        self.items.iter().find_map(|i| match i {
            Item::Model(m) if m.name == name => Some(m),
            _ => None,
        })
    }

    pub fn submodel_mut(&mut self, name: &str) -> Option<&mut Model> {
        self.items.iter_mut().find_map(|i| match i {
            Item::Model(m) if m.name == name => Some(m),
            _ => None,
        })
    }

    /// Handle of the Reference at a dot-separated path below this model.
    pub fn lookup(&self, qualified: &str) -> Option<Ref> {
        if let Some((head, rest)) = qualified.split_once('.') {
            if let Some(sub) = self.submodel(head) {
                return sub.lookup(rest);
            }
        }
        self.items.iter().find_map(|i| match i {
            Item::Reference { name, key, .. } if name == qualified => Some(Ref(*key)),
            _ => None,
        })
    }

    /// Every Reference below this model in declaration order, depth first.
    pub(crate) fn entries(&self) -> Vec<(String, RefKey, &Reference)> {
        let mut out = Vec::new();
        self.collect_entries("", &mut out);
        out
    }

    fn collect_entries<'a>(&'a self, prefix: &str, out: &mut Vec<(String, RefKey, &'a Reference)>) {
        for item in &self.items {
            match item {
                Item::Reference { name, key, def } => out.push((qualify(prefix, name), *key, def)),
                Item::Model(sub) => sub.collect_entries(&qualify(prefix, &sub.name), out),
            }
        }
    }

    /// Wiring registered anywhere below this model.
    pub(crate) fn all_wires(&self) -> Vec<PendingWire> {
        let mut out = self.wires.clone();
        for item in &self.items {
            if let Item::Model(sub) = item {
                out.extend(sub.all_wires());
            }
        }
        out
    }

    /// The definition behind a handle and its qualified name.
    pub fn get(&self, r: Ref) -> Option<(String, &Reference)> {
        self.entries().into_iter().find(|(_, key, _)| *key == r.key()).map(|(name, _, def)| (name, def))
    }

    pub fn qualified_name(&self, r: Ref) -> Option<String> { self.get(r).map(|(name, _)| name) }

    fn find_mut(&mut self, key: RefKey, prefix: &str) -> Option<(String, &mut Reference)> {
        for item in &mut self.items {
            match item {
                Item::Reference { name, key: k, def } if *k == key => return Some((qualify(prefix, name), def)),
                Item::Model(sub) => {
                    let path = qualify(prefix, &sub.name);
                    if let Some(found) = sub.find_mut(key, &path) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn resolve_mut(&mut self, r: Ref) -> Result<(String, &mut Reference), DefinitionError> {
        self.find_mut(r.key(), "").ok_or(DefinitionError::UnknownReference { name: r.key().to_string() })
    }

    // ---- binding phase ---------------------------------------------------

    /// Sets the equation of a Flow, Variable, Metric or Scalar (last write
    /// wins). Binding a Variable's equation drops its prior.
    pub fn bind(&mut self, r: Ref, equation: impl Into<Expr>) -> Result<(), DefinitionError> {
        let equation = equation.into();
        let (name, def) = self.resolve_mut(r)?;
        match def.kind {
            RefKind::Flow | RefKind::Metric => {}
            RefKind::Variable => def.prior = None,
            RefKind::Scalar if equation.as_constant().is_some() => {}
            RefKind::Scalar => return Err(incompatible(&name, def.kind, "derived equation")),
            RefKind::Stock | RefKind::TimeRef => return Err(incompatible(&name, def.kind, "equation")),
        }
        def.equation = Some(equation);
        Ok(())
    }

    /// Replaces a Flow's clamp bounds.
    pub fn set_bounds(&mut self, r: Ref, min: Option<Expr>, max: Option<Expr>) -> Result<(), DefinitionError> {
        let (name, def) = self.resolve_mut(r)?;
        if def.kind != RefKind::Flow {
            return Err(incompatible(&name, def.kind, "bounded Flow"));
        }
        def.min = min;
        def.max = max;
        Ok(())
    }

    /// Makes a Variable free with `prior`, dropping its equation.
    pub fn set_prior(&mut self, r: Ref, prior: Distribution) -> Result<(), DefinitionError> {
        let (name, def) = self.resolve_mut(r)?;
        if def.kind != RefKind::Variable {
            return Err(incompatible(&name, def.kind, "Variable with a prior"));
        }
        def.prior = Some(prior);
        def.equation = None;
        Ok(())
    }

    pub fn set_init(&mut self, r: Ref, init: impl Into<FreeValue>) -> Result<(), DefinitionError> {
        let (name, def) = self.resolve_mut(r)?;
        if def.kind != RefKind::Stock {
            return Err(incompatible(&name, def.kind, "Stock with an init"));
        }
        def.init = Some(init.into());
        Ok(())
    }

    // ---- wiring ----------------------------------------------------------

    fn wire(&mut self, stock: Ref, source: Ref, direction: FlowDirection) -> Result<(), DefinitionError> {
        let (stock_name, stock_def) = self.get(stock).ok_or(DefinitionError::UnknownReference { name: stock.key().to_string() })?;
        let (source_name, source_def) = self.get(source).ok_or(DefinitionError::UnknownReference { name: source.key().to_string() })?;
        let invalid = |reason: String| DefinitionError::InvalidWiring {
            stock: stock_name.clone(),
            source_name: source_name.clone(),
            reason,
        };
        if stock_def.kind != RefKind::Stock {
            return Err(invalid(format!("target is a {}, not a Stock", stock_def.kind)));
        }
        if !matches!(source_def.kind, RefKind::Flow | RefKind::Variable) {
            return Err(invalid(format!("source is a {}; only Flows and Variables can feed a Stock", source_def.kind)));
        }
        let all = self.all_wires();
        if let Some(existing) = all.iter().find(|w| w.source == source.key() && w.direction == direction) {
            let existing = self
                .get(Ref(existing.stock))
                .map(|(n, _)| n)
                .unwrap_or_else(|| existing.stock.to_string());
            let direction = match direction {
                FlowDirection::Inflow => "inflow",
                FlowDirection::Outflow => "outflow",
            };
            return Err(DefinitionError::DuplicateWiring {
                source_name,
                direction: direction.to_string(),
                existing,
                stock: stock_name,
            });
        }
        self.wires.push(PendingWire { stock: stock.key(), source: source.key(), direction });
        Ok(())
    }

    /// `stock += source`
    pub fn inflow(&mut self, stock: Ref, source: Ref) -> Result<(), DefinitionError> {
        self.wire(stock, source, FlowDirection::Inflow)
    }

    /// `stock -= source`
    pub fn outflow(&mut self, stock: Ref, source: Ref) -> Result<(), DefinitionError> {
        self.wire(stock, source, FlowDirection::Outflow)
    }

    /// `a >> b >> c`: a flow after a stock drains it, a flow before a stock
    /// fills it.
    pub fn chain(&mut self, refs: &[Ref]) -> Result<(), DefinitionError> {
        for pair in refs.windows(2) {
            let kind_of = |r: Ref| self.get(r).map(|(_, d)| d.kind).ok_or(DefinitionError::UnknownReference { name: r.key().to_string() });
            let (a, b) = (pair[0], pair[1]);
            match (kind_of(a)?, kind_of(b)?) {
                (RefKind::Stock, RefKind::Stock) => {
                    return Err(DefinitionError::InvalidWiring {
                        stock: self.qualified_name(b).unwrap_or_default(),
                        source_name: self.qualified_name(a).unwrap_or_default(),
                        reason: "two Stocks cannot be chained directly".into(),
                    })
                }
                (RefKind::Stock, _) => self.outflow(a, b)?,
                (_, RefKind::Stock) => self.inflow(b, a)?,
                _ => {
                    return Err(DefinitionError::InvalidWiring {
                        stock: self.qualified_name(b).unwrap_or_default(),
                        source_name: self.qualified_name(a).unwrap_or_default(),
                        reason: "a chain must alternate Stocks and flows".into(),
                    })
                }
            }
        }
        Ok(())
    }

    // ---- calibration surface ---------------------------------------------

    /// Qualified names of every tunable quantity: free Variables and Stock
    /// inits (`<stock>.init`), in declaration order.
    pub fn free_refs(&self, recursive: bool) -> Vec<String> {
        self.free_values(recursive).into_iter().map(|(name, _)| name).collect()
    }

    fn free_values(&self, recursive: bool) -> Vec<(String, FreeValue)> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                Item::Reference { name, def, .. } => {
                    if let Some(value) = free_value(def) {
                        let name = if def.kind == RefKind::Stock { format!("{}.init", name) } else { name.clone() };
                        out.push((name, value));
                    }
                }
                Item::Model(sub) if recursive => {
                    out.extend(sub.free_values(true).into_iter().map(|(n, v)| (qualify(&sub.name, &n), v)));
                }
                Item::Model(_) => {}
            }
        }
        out
    }

    /// Current value or prior of every free quantity, across sub-models.
    pub fn config(&self) -> BTreeMap<String, FreeValue> { self.free_values(true).into_iter().collect() }

    /// Assigns a fixed value or a prior to a free quantity named as in
    /// `free_refs`.
    pub fn set_free(&mut self, name: &str, value: impl Into<FreeValue>) -> Result<(), DefinitionError> {
        let value = value.into();
        if let Some(r) = self.lookup(name) {
            let (qualified, def) = self.resolve_mut(r)?;
            if !def.is_free() {
                return Err(incompatible(&qualified, format!("derived {}", def.kind), "free value"));
            }
            match value {
                FreeValue::Fixed(v) => {
                    if v.len() != 1 && v.len() != def.dim {
                        return Err(DefinitionError::DimensionMismatch { name: qualified, declared: def.dim, found: v.len() });
                    }
                    def.equation = Some(Expr::Const { value: v });
                    def.prior = None;
                }
                FreeValue::Prior(d) => {
                    def.prior = Some(d);
                    def.equation = None;
                }
            }
            return Ok(());
        }
        if let Some(stock) = name.strip_suffix(".init").and_then(|s| self.lookup(s)) {
            return self.set_init(stock, value);
        }
        Err(DefinitionError::UnknownReference { name: name.to_string() })
    }

    pub fn apply_config(&mut self, config: &BTreeMap<String, FreeValue>) -> Result<(), DefinitionError> {
        let errors = config
            .iter()
            .filter_map(|(name, value)| self.set_free(name, value.clone()).err())
            .collect();
        DefinitionError::collect(errors)
    }

    // ---- runs ------------------------------------------------------------

    /// Resolves, validates and orders the whole tree.
    pub fn flatten(&self) -> Result<FlatModel, DefinitionError> { FlatModel::build(self) }

    pub fn simulate(&self, steps: usize, repetitions: usize) -> Result<Trace, SimulationError> {
        self.simulate_with(&RunConfig::new(steps, repetitions))
    }

    pub fn simulate_with(&self, config: &RunConfig) -> Result<Trace, SimulationError> {
        compute::simulate(&self.flatten()?, config)
    }

    pub fn infer(&self, observations: &[Observation], prior_only: bool, config: &InferConfig) -> Result<Trace, InferenceError> {
        solver::infer(&self.flatten()?, observations, prior_only, config, &CancelToken::new())
    }

    /// Observation of a Metric held by handle.
    pub fn observe(&self, metric: Ref, data: Vec<f64>, tolerance: f64) -> Result<Observation, DefinitionError> {
        let name = self.qualified_name(metric).ok_or(DefinitionError::UnknownReference { name: metric.key().to_string() })?;
        Ok(Observation::new(name, data, tolerance))
    }

    // ---- records ---------------------------------------------------------

    pub fn to_record(&self) -> Result<ModelRecord, DefinitionError> {
        let names: HashMap<RefKey, String> = self.entries().into_iter().map(|(name, key, _)| (key, name)).collect();
        self.record_with(&names)
    }

    fn record_with(&self, names: &HashMap<RefKey, String>) -> Result<ModelRecord, DefinitionError> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(match item {
                Item::Reference { name, key, def } => {
                    let owner = names.get(key).cloned().unwrap_or_else(|| name.clone());
                    let mut to_names = |k: &RefKey| names.get(k).cloned().ok_or(DefinitionError::DanglingReference { name: owner.clone() });
                    ItemRecord::Reference(ReferenceRecord {
                        name: name.clone(),
                        kind: def.kind,
                        dtype: def.dtype,
                        dim: def.dim,
                        equation: def.equation.as_ref().map(|e| e.map_refs(&mut to_names)).transpose()?,
                        init: def.init.clone(),
                        min: def.min.as_ref().map(|e| e.map_refs(&mut to_names)).transpose()?,
                        max: def.max.as_ref().map(|e| e.map_refs(&mut to_names)).transpose()?,
                        prior: def.prior.clone(),
                        doc: def.doc.clone(),
                    })
                }
                Item::Model(sub) => ItemRecord::Model(sub.record_with(names)?),
            });
        }
        let mut wires = Vec::with_capacity(self.wires.len());
        for w in &self.wires {
            let name_of = |k: &RefKey| names.get(k).cloned().ok_or(DefinitionError::DanglingReference { name: format!("wiring of {}", k) });
            wires.push(WireRecord { stock: name_of(&w.stock)?, source: name_of(&w.source)?, direction: w.direction });
        }
        Ok(ModelRecord { name: self.name.clone(), doc: self.doc.clone(), steps: self.steps, items, wires })
    }

    /// Rebuilds a model from a record: structure first, then equations and
    /// wiring against the rebuilt handles.
    pub fn from_record(record: &ModelRecord) -> Result<Model, DefinitionError> {
        let mut keys = HashMap::new();
        let mut model = Self::structure_from(record, "", &mut keys)?;
        model.bind_from(record, &keys)?;
        Ok(model)
    }

    fn structure_from(record: &ModelRecord, prefix: &str, keys: &mut HashMap<String, RefKey>) -> Result<Model, DefinitionError> {
        let mut model = Model { name: record.name.clone(), doc: record.doc.clone(), steps: record.steps, items: Vec::new(), wires: Vec::new() };
        for item in &record.items {
            match item {
                ItemRecord::Reference(r) => {
                    let def = Reference {
                        kind: r.kind,
                        dtype: r.dtype,
                        dim: r.dim,
                        equation: None,
                        init: r.init.clone(),
                        min: None,
                        max: None,
                        prior: r.prior.clone(),
                        doc: r.doc.clone(),
                    };
                    let handle = model.add(r.name.clone(), def)?;
                    keys.insert(qualify(prefix, &r.name), handle.key());
                }
                ItemRecord::Model(sub) => {
                    let nested = Self::structure_from(sub, &qualify(prefix, &sub.name), keys)?;
                    model.add_model(sub.name.clone(), nested)?;
                }
            }
        }
        Ok(model)
    }

    fn bind_from(&mut self, record: &ModelRecord, keys: &HashMap<String, RefKey>) -> Result<(), DefinitionError> {
        let key_of = |name: &String| keys.get(name).copied().ok_or(DefinitionError::UnknownReference { name: name.clone() });
        for item in &record.items {
            match item {
                ItemRecord::Reference(r) => {
                    let idx = self.position(&r.name).ok_or(DefinitionError::UnknownReference { name: r.name.clone() })?;
                    let convert = |e: &Option<Expr<String>>| e.as_ref().map(|e| e.map_refs(&mut |n: &String| key_of(n))).transpose();
                    let (equation, min, max) = (convert(&r.equation)?, convert(&r.min)?, convert(&r.max)?);
                    if let Item::Reference { def, .. } = &mut self.items[idx] {
                        def.equation = equation;
                        def.min = min;
                        def.max = max;
                    }
                }
                ItemRecord::Model(sub) => {
                    let nested = self.submodel_mut(&sub.name).ok_or(DefinitionError::UnknownReference { name: sub.name.clone() })?;
                    nested.bind_from(sub, keys)?;
                }
            }
        }
        for w in &record.wires {
            self.wires.push(PendingWire { stock: key_of(&w.stock)?, source: key_of(&w.source)?, direction: w.direction });
        }
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> crate::Result<()> { self.to_record()?.save_json(path) }

    pub fn load_json(path: impl AsRef<Path>) -> crate::Result<Model> {
        Ok(Model::from_record(&ModelRecord::load_json(path)?)?)
    }
}

fn free_value(def: &Reference) -> Option<FreeValue> {
    match def.kind {
        RefKind::Stock => Some(def.init.clone().unwrap_or_default()),
        RefKind::Variable => match (&def.prior, &def.equation) {
            (Some(prior), _) => Some(FreeValue::Prior(prior.clone())),
            (None, Some(Expr::Const { value })) => Some(FreeValue::Fixed(value.clone())),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ops::min;
    use crate::store::Value;

    fn tub() -> (Model, Ref, Ref, Ref) {
        let mut m = Model::new("tub");
        let level = m.add("level", Reference::stock()).unwrap();
        let fill = m.add("fill", Reference::flow_eq(5.0)).unwrap();
        let drain = m.add("drain", Reference::flow()).unwrap();
        m.chain(&[fill, level, drain]).unwrap();
        (m, level, fill, drain)
    }

    #[test]
    fn readding_same_kind_keeps_handle() {
        let mut m = Model::new("m");
        let a = m.add("rate", Reference::variable(1.0)).unwrap();
        let b = m.add("rate", Reference::variable(2.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.get(a).unwrap().1.equation, Some(Expr::constant(2.0)));
    }

    #[test]
    fn readding_other_kind_fails() {
        let mut m = Model::new("m");
        m.add("x", Reference::stock()).unwrap();
        let err = m.add("x", Reference::flow()).unwrap_err();
        assert!(matches!(err, DefinitionError::IncompatibleKind { ref name, .. } if name == "x"));
    }

    #[test]
    fn names_are_validated() {
        let mut m = Model::new("m");
        assert!(matches!(m.add("a.b", Reference::stock()), Err(DefinitionError::InvalidName { .. })));
        assert!(matches!(m.add("", Reference::stock()), Err(DefinitionError::InvalidName { .. })));
        assert!(matches!(m.add("1x", Reference::stock()), Err(DefinitionError::InvalidName { .. })));
    }

    #[test]
    fn chain_wires_both_directions() {
        let (m, level, fill, drain) = tub();
        let wires = m.all_wires();
        assert_eq!(wires.len(), 2);
        assert!(wires.contains(&PendingWire { stock: level.key(), source: fill.key(), direction: FlowDirection::Inflow }));
        assert!(wires.contains(&PendingWire { stock: level.key(), source: drain.key(), direction: FlowDirection::Outflow }));
    }

    #[test]
    fn second_inflow_slot_is_rejected_eagerly() {
        let (mut m, _, fill, _) = tub();
        let other = m.add("other", Reference::stock()).unwrap();
        assert!(matches!(m.inflow(other, fill), Err(DefinitionError::DuplicateWiring { .. })));
    }

    #[test]
    fn binding_across_submodels() {
        let mut tank = Model::new("tank");
        let level = tank.add("level", Reference::stock().init(10.0)).unwrap();
        let mut pump = Model::new("pump");
        let drain = pump.add("drain", Reference::flow()).unwrap();

        let mut plant = Model::new("plant");
        plant.add_model("tank", tank).unwrap();
        plant.add_model("pump", pump).unwrap();
        plant.bind(drain, min(level, 3.0)).unwrap();
        plant.outflow(level, drain).unwrap();

        assert_eq!(plant.qualified_name(drain).as_deref(), Some("pump.drain"));
        assert_eq!(plant.lookup("tank.level"), Some(level));
        assert!(plant.get(drain).unwrap().1.equation.is_some());
    }

    #[test]
    fn free_refs_and_config() {
        let mut inner = Model::new("inner");
        inner.add("k", Reference::free(Distribution::uniform(0.0, 1.0))).unwrap();
        inner.add("derived", Reference::variable(crate::graph::ops::exp(0.0))).unwrap();
        let mut m = Model::new("root");
        m.add("rate", Reference::variable(0.5)).unwrap();
        m.add("level", Reference::stock().init(3.0)).unwrap();
        m.add_model("inner", inner).unwrap();

        assert_eq!(m.free_refs(true), vec!["rate", "level.init", "inner.k"]);
        assert_eq!(m.free_refs(false), vec!["rate", "level.init"]);

        let config = m.config();
        assert_eq!(config["rate"], FreeValue::from(0.5));
        assert_eq!(config["inner.k"], FreeValue::Prior(Distribution::uniform(0.0, 1.0)));
    }

    #[test]
    fn set_free_by_name() {
        let mut m = Model::new("root");
        m.add("rate", Reference::variable(0.5)).unwrap();
        let level = m.add("level", Reference::stock()).unwrap();
        m.set_free("rate", Distribution::normal(1.0, 0.1)).unwrap();
        m.set_free("level.init", 7.0).unwrap();
        assert_eq!(m.config()["rate"], FreeValue::Prior(Distribution::normal(1.0, 0.1)));
        assert_eq!(m.get(level).unwrap().1.init, Some(FreeValue::from(7.0)));
        assert!(matches!(m.set_free("missing", 1.0), Err(DefinitionError::UnknownReference { .. })));
    }

    #[test]
    fn set_free_keeps_the_declared_dimension() {
        let mut m = Model::new("root");
        let weights = m.add("weights", Reference::variable(vec![1.0, 2.0]).dim(2)).unwrap();
        let err = m.set_free("weights", Value::from(vec![1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(err, DefinitionError::DimensionMismatch { name: "weights".into(), declared: 2, found: 3 });
        m.set_free("weights", 4.0).unwrap();
        assert_eq!(m.get(weights).unwrap().1.dim, 2);
        m.set_free("weights", Value::from(vec![5.0, 6.0])).unwrap();
        assert_eq!(m.config()["weights"], FreeValue::from(Value::from(vec![5.0, 6.0])));
    }

    #[test]
    fn apply_config_round_trips_snapshot() {
        let mut m = Model::new("root");
        m.add("a", Reference::variable(1.0)).unwrap();
        m.add("b", Reference::free(Distribution::bernoulli(0.5))).unwrap();
        let mut snapshot = m.config();
        snapshot.insert("a".into(), FreeValue::from(9.0));
        m.apply_config(&snapshot).unwrap();
        assert_eq!(m.config(), snapshot);
    }
}
