//! Validation rule for stock/flow wiring.

use crate::store::{FlowDirection, NodeId, RefKind, Registry};
use crate::validation::error::DefinitionError;
use std::collections::HashMap;

/// Targets must be Stocks, sources Flows or Variables, and a source may sit
/// in each direction slot of at most one Stock.
pub(crate) fn validate_wiring(registry: &Registry) -> Vec<DefinitionError> {
    let mut errors = Vec::new();
    let mut slots: HashMap<(NodeId, FlowDirection), NodeId> = HashMap::new();

    for wire in &registry.wires {
        let stock = registry.name(wire.stock).to_string();
        let source_name = registry.name(wire.source).to_string();
        if registry.kind(wire.stock) != RefKind::Stock {
            let reason = format!("target is a {}, not a Stock", registry.kind(wire.stock));
            errors.push(DefinitionError::InvalidWiring { stock, source_name, reason });
            continue;
        }
        if !matches!(registry.kind(wire.source), RefKind::Flow | RefKind::Variable) {
            let reason = format!("source is a {}; only Flows and Variables can feed a Stock", registry.kind(wire.source));
            errors.push(DefinitionError::InvalidWiring { stock, source_name, reason });
            continue;
        }
        if let Some(existing) = slots.insert((wire.source, wire.direction), wire.stock) {
            let direction = match wire.direction {
                FlowDirection::Inflow => "inflow",
                FlowDirection::Outflow => "outflow",
            };
            errors.push(DefinitionError::DuplicateWiring {
                source_name,
                direction: direction.to_string(),
                existing: registry.name(existing).to_string(),
                stock,
            });
        }
    }
    errors
}
