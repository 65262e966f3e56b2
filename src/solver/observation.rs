use super::error::InferenceError;
use crate::graph::FlatModel;
use crate::store::{NodeId, RefKind};
use serde::{Deserialize, Serialize};

/// Observed data for one Metric.
///
/// `tolerance` is the standard deviation of the Gaussian noise model. A
/// scalar Metric treats each datum as an independent observation; a vector
/// Metric expects exactly one datum per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub metric: String,
    pub data: Vec<f64>,
    pub tolerance: f64,
}

impl Observation {
    pub fn new(metric: impl Into<String>, data: Vec<f64>, tolerance: f64) -> Self {
        Self { metric: metric.into(), data, tolerance }
    }

    /// Checks the observation against a flattened model and returns the
    /// observed Metric.
    pub fn resolve(&self, model: &FlatModel) -> Result<NodeId, InferenceError> {
        let malformed = |detail: String| InferenceError::MalformedObservation { metric: self.metric.clone(), detail };
        let id = model
            .registry
            .id_of(&self.metric)
            .ok_or_else(|| malformed("no such Reference".into()))?;
        let kind = model.registry.kind(id);
        if kind != RefKind::Metric {
            return Err(malformed(format!("target is a {}, only Metrics can be observed", kind)));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(malformed(format!("tolerance must be positive and finite, got {}", self.tolerance)));
        }
        if self.data.is_empty() {
            return Err(malformed("no data".into()));
        }
        if let Some(bad) = self.data.iter().find(|v| !v.is_finite()) {
            return Err(malformed(format!("non-finite datum {}", bad)));
        }
        let dim = model.registry.meta[id.index()].dim;
        if dim > 1 && self.data.len() != dim {
            return Err(malformed(format!("expected {} values for a metric of dim {}, got {}", dim, dim, self.data.len())));
        }
        Ok(id)
    }
}
