//! Defines the error types for the validation module.
use crate::store::RefKind;
use thiserror::Error;

/// A structural problem with a model definition.
///
/// Raised while building or flattening a model, never mid-run. Every variant
/// names the offending Reference(s) by qualified name.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("'{name}' is already a {existing}; cannot redefine it as {requested}")]
    IncompatibleKind { name: String, existing: String, requested: String },

    #[error("no Reference named '{name}'")]
    UnknownReference { name: String },

    #[error("'{name}' reads a Reference that is not part of this model")]
    DanglingReference { name: String },

    #[error("Reference '{name}' is registered more than once (also as '{other}')")]
    DuplicateReference { name: String, other: String },

    #[error("cannot wire '{source_name}' to '{stock}': {reason}")]
    InvalidWiring { stock: String, source_name: String, reason: String },

    #[error("'{source_name}' is already an {direction} of '{existing}'; cannot also feed '{stock}'")]
    DuplicateWiring { source_name: String, direction: String, existing: String, stock: String },

    #[error("dimension mismatch on '{name}': declared {declared}, found {found}")]
    DimensionMismatch { name: String, declared: usize, found: usize },

    #[error("dependency cycle among [{}]", names.join(", "))]
    Cycle { names: Vec<String> },

    #[error("invalid interpolation table in '{name}': {detail}")]
    InvalidTable { name: String, detail: String },

    #[error("'{name}' has a piecewise with {branches} branches but {conditions} conditions")]
    MalformedPiecewise { name: String, branches: usize, conditions: usize },

    #[error("invalid prior on '{name}': {detail}")]
    InvalidPrior { name: String, detail: String },

    #[error("{kind} '{name}' has no equation")]
    MissingEquation { name: String, kind: RefKind },

    #[error("'{name}' uses a series operator; only Metrics may")]
    SeriesOperatorOutsideMetric { name: String },

    #[error("'{name}' reads Metric '{metric}' inside a step equation")]
    MetricInStepEquation { name: String, metric: String },

    #[error("{} definition errors:\n{}", .0.len(), .0.iter().map(|e| format!("  {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<DefinitionError>),
}

impl DefinitionError {
    /// Collapses a batch of errors: one error stays itself, several become `Multiple`.
    pub fn collect(mut errors: Vec<DefinitionError>) -> Result<(), DefinitionError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(DefinitionError::Multiple(errors)),
        }
    }

    /// Flattened view over `Multiple`.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &DefinitionError> + '_> {
        match self {
            DefinitionError::Multiple(all) => Box::new(all.iter().flat_map(|e| e.iter())),
            other => Box::new(std::iter::once(other)),
        }
    }
}
