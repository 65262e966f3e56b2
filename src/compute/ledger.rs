use crate::store::NodeId;
use crate::validation::DefinitionError;
use thiserror::Error;

/// Kernel-level numeric failure, without model context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericFault {
    #[error("division by zero")]
    DivisionByZero,
    #[error("{func} is undefined at {value}")]
    OutOfDomain { func: &'static str, value: f64 },
    #[error("cannot broadcast operands of length {lhs} and {rhs}")]
    ShapeMismatch { lhs: usize, rhs: usize },
    #[error("index {index} is out of range for a series of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("non-finite result")]
    NonFinite,
    /// A node with neither an equation nor a drawn value. Flattening rejects
    /// such models, so a run never sees it.
    #[error("nothing to evaluate")]
    Unbound,
}

/// A numeric fault located in a run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("'{name}' failed at step {step} of repetition {repetition}: {fault}")]
pub struct RuntimeError {
    pub name: String,
    pub step: usize,
    pub repetition: usize,
    pub fault: NumericFault,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("all {} repetitions failed; first: {}", .failures.len(), .failures.first().map(|f| f.to_string()).unwrap_or_default())]
    AllRepetitionsFailed { failures: Vec<RuntimeError> },
}

/// Recorded values of one run, in any value domain.
///
/// Series kinds get one entry per step; Metrics a single value.
#[derive(Debug, Clone)]
pub struct Ledger<V> {
    series: Vec<Vec<V>>,
    metrics: Vec<Option<V>>,
}

impl<V: Clone> Ledger<V> {
    pub fn new(count: usize, steps: usize) -> Self {
        Self {
            series: (0..count).map(|_| Vec::with_capacity(steps + 1)).collect(),
            metrics: vec![None; count],
        }
    }

    pub fn push(&mut self, node_id: NodeId, value: V) {
        self.series[node_id.index()].push(value);
    }

    /// Value recorded at step `t`.
    pub fn at(&self, node_id: NodeId, t: usize) -> Option<&V> {
        self.series.get(node_id.index())?.get(t)
    }

    pub fn last(&self, node_id: NodeId) -> Option<&V> {
        self.series.get(node_id.index())?.last()
    }

    pub fn series(&self, node_id: NodeId) -> &[V] {
        self.series.get(node_id.index()).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn metric(&self, node_id: NodeId) -> Option<&V> {
        self.metrics.get(node_id.index())?.as_ref()
    }

    pub fn insert_metric(&mut self, node_id: NodeId, value: V) {
        let idx = node_id.index();
        if idx >= self.metrics.len() {
            self.metrics.resize(idx + 1, None);
        }
        self.metrics[idx] = Some(value);
    }
}
