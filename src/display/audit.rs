use crate::compute::Trace;
use crate::graph::{Expr, FlatModel};
use crate::store::{FlowDirection, FreeValue, NodeId, RefKind};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the dependency tree behind `target` with the values of the first
/// sample in `trace` (final step for series).
///
/// Each Reference is expanded once; later appearances point back to the
/// level where it was first printed.
pub fn format_audit(model: &FlatModel, trace: &Trace, target: &str) -> String {
    let mut auditor = Auditor { model, trace, visited_at_level: HashMap::new(), output: String::new() };

    match model.id_of(target) {
        Some(id) => {
            let _ = writeln!(auditor.output, "AUDIT TRACE for '{}':", target);
            let _ = writeln!(auditor.output, "--------------------------------------------------");
            auditor.audit_node(id, 1, "");
        }
        None => {
            let _ = writeln!(auditor.output, "Error: no Reference named '{}'", target);
        }
    }
    auditor.output
}

struct Auditor<'a> {
    model: &'a FlatModel,
    trace: &'a Trace,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl Auditor<'_> {
    fn audit_node(&mut self, id: NodeId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(id, level);

        let model = self.model;
        let registry = &model.registry;
        let name = registry.name(id);
        let header = format!("[L{}] {}{}", level, name, self.format_value(id));

        match registry.kind(id) {
            RefKind::Stock => {
                let init = registry.inits[id.index()].clone().unwrap_or_default();
                let flows: Vec<String> = registry
                    .wires
                    .iter()
                    .filter(|w| w.stock == id)
                    .map(|w| {
                        let sign = if w.direction == FlowDirection::Inflow { '+' } else { '-' };
                        format!("{}{}", sign, registry.name(w.source))
                    })
                    .collect();
                let _ = writeln!(self.output, "{}{} = stock(init {}; {})", prefix, header, init, flows.join(" "));
                let sources: Vec<NodeId> = registry.wires.iter().filter(|w| w.stock == id).map(|w| w.source).collect();
                self.recurse_children(prefix, &sources, level);
            }
            RefKind::TimeRef => {
                let _ = writeln!(self.output, "{}{} -> time", prefix, header);
            }
            _ => {
                let idx = id.index();
                let (text, reads) = match (&registry.equations[idx], &registry.priors[idx]) {
                    (Some(eq), _) => {
                        let mut reads = Vec::new();
                        eq.visit_refs(&mut |&r, _| {
                            if !reads.contains(&r) {
                                reads.push(r);
                            }
                        });
                        (eq.render(&|r: &NodeId| registry.name(*r).to_string()), reads)
                    }
                    (None, Some(prior)) => (FreeValue::Prior(prior.clone()).to_string(), Vec::new()),
                    (None, None) => ("?".to_string(), Vec::new()),
                };
                let bounds = &registry.bounds[idx];
                let clamp = match (&bounds.min, &bounds.max) {
                    (None, None) => String::new(),
                    (min, max) => {
                        let show = |b: &Option<Expr<NodeId>>| match b {
                            Some(e) => e.render(&|r: &NodeId| registry.name(*r).to_string()),
                            None => "-".to_string(),
                        };
                        format!(" clamped to [{}, {}]", show(min), show(max))
                    }
                };
                let _ = writeln!(self.output, "{}{} = {}{}", prefix, header, text, clamp);
                self.recurse_children(prefix, &reads, level);
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[NodeId], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.audit_node(child, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn format_value(&self, id: NodeId) -> String {
        let name = self.model.registry.name(id);
        let Some(array) = self.trace.get(name) else {
            return "[?]".to_string();
        };
        let width = array.shape.last().copied().unwrap_or(0);
        let first = if array.is_series() {
            array.shape[1].checked_sub(1).and_then(|t| array.get(&[0, t, 0]))
        } else {
            array.get(&[0, 0])
        };
        match first {
            Some(v) if width > 1 => format!("[{:.3}, ...]", v),
            Some(v) => format!("[{:.3}]", v),
            None => "[?]".to_string(),
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String { current_prefix.replace("`--", "   ").replace("|--", "|  ") }
