//! Validation rule for prior distributions.

use crate::store::{FreeValue, NodeId, Registry};
use crate::validation::error::DefinitionError;

pub(crate) fn validate_priors(registry: &Registry, id: NodeId) -> Vec<DefinitionError> {
    let idx = id.index();
    let name = registry.name(id);
    let init_prior = match &registry.inits[idx] {
        Some(FreeValue::Prior(dist)) => Some((format!("{}.init", name), dist)),
        _ => None,
    };
    registry.priors[idx]
        .as_ref()
        .map(|dist| (name.to_string(), dist))
        .into_iter()
        .chain(init_prior)
        .filter_map(|(name, dist)| dist.validate().err().map(|detail| DefinitionError::InvalidPrior { name, detail }))
        .collect()
}
