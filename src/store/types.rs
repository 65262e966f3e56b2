use serde::{Deserialize, Serialize};
use super::distribution::Distribution;
use super::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dense index of a Reference inside a flattened model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a Reference at authoring time.
///
/// Keys survive nesting a model inside another one, which is what lets an
/// equation in one sub-model point at a Reference owned by a sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefKey(u64);

impl RefKey {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// Accumulator carried across steps, changed only through its flows.
    Stock,
    /// Per-step rate applied to one or more stocks, optionally clamped.
    Flow,
    Variable,
    /// Post-run reduction over recorded series.
    Metric,
    /// Evaluates to the current step index.
    TimeRef,
    /// Literal constant.
    Scalar,
}

impl RefKind {
    /// Kinds recorded with a time axis.
    pub fn is_series(&self) -> bool {
        matches!(self, RefKind::Stock | RefKind::Flow | RefKind::Variable | RefKind::TimeRef)
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefKind::Stock => "Stock",
            RefKind::Flow => "Flow",
            RefKind::Variable => "Variable",
            RefKind::Metric => "Metric",
            RefKind::TimeRef => "TimeRef",
            RefKind::Scalar => "Scalar",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    #[default]
    Float,
    /// Results are rounded every step.
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Inflow,
    Outflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefMetadata {
    /// Dot-separated path from the flattened root.
    pub name: String,
    pub dtype: Dtype,
    pub dim: usize,
    pub doc: Option<String>,
}

/// Concrete setting of a free Reference: a fixed value or a prior.
///
/// Serialises as a bare number/array or as a `{"dist": ...}` object, which is
/// the shape of `Model::config()` snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FreeValue {
    Fixed(Value),
    Prior(Distribution),
}

impl Default for FreeValue {
    fn default() -> Self { FreeValue::Fixed(Value::Scalar(0.0)) }
}

impl From<f64> for FreeValue {
    fn from(v: f64) -> Self { FreeValue::Fixed(Value::Scalar(v)) }
}

impl From<Value> for FreeValue {
    fn from(v: Value) -> Self { FreeValue::Fixed(v) }
}

impl From<Distribution> for FreeValue {
    fn from(d: Distribution) -> Self { FreeValue::Prior(d) }
}

impl fmt::Display for FreeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeValue::Fixed(v) => write!(f, "{}", v),
            FreeValue::Prior(d) => write!(f, "{}", d),
        }
    }
}

/// One stock/flow registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub stock: NodeId,
    pub source: NodeId,
    pub direction: FlowDirection,
}
