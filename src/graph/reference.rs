//! The atomic graph node: a named, typed slot holding a constant, an
//! equation, or a prior.

use super::expr::{Expr, ReduceOp};
use crate::store::{Distribution, Dtype, FreeValue, RefKey, RefKind, Value};

/// Definition of a Reference, independent of where it is registered.
///
/// Construct one with the kind-specific constructors and hand it to
/// `Model::add`, which assigns the name and returns a `Ref` handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: RefKind,
    pub dtype: Dtype,
    pub dim: usize,
    pub equation: Option<Expr>,
    /// Stock only; defaults to 0.
    pub init: Option<FreeValue>,
    /// Flow only; applied after the raw equation, `min` first.
    pub min: Option<Expr>,
    pub max: Option<Expr>,
    /// Variable only; makes the Reference free for calibration.
    pub prior: Option<Distribution>,
    pub doc: Option<String>,
}

impl Reference {
    fn of_kind(kind: RefKind) -> Self {
        Self {
            kind,
            dtype: Dtype::Float,
            dim: 1,
            equation: None,
            init: if kind == RefKind::Stock { Some(FreeValue::default()) } else { None },
            min: None,
            max: None,
            prior: None,
            doc: None,
        }
    }

    pub fn stock() -> Self { Self::of_kind(RefKind::Stock) }

    /// Flow whose equation is bound later.
    pub fn flow() -> Self { Self::of_kind(RefKind::Flow) }

    pub fn flow_eq(equation: impl Into<Expr>) -> Self { Self::flow().equation(equation) }

    pub fn variable(equation: impl Into<Expr>) -> Self {
        Self::of_kind(RefKind::Variable).equation(equation)
    }

    /// Variable whose equation is bound later.
    pub fn unbound_variable() -> Self { Self::of_kind(RefKind::Variable) }

    /// Variable drawn from `prior` once per repetition.
    pub fn free(prior: Distribution) -> Self {
        let mut r = Self::of_kind(RefKind::Variable);
        r.prior = Some(prior);
        r
    }

    pub fn metric(equation: impl Into<Expr>) -> Self {
        Self::of_kind(RefKind::Metric).equation(equation)
    }

    pub fn time() -> Self { Self::of_kind(RefKind::TimeRef) }

    pub fn scalar(value: impl Into<Value>) -> Self {
        let value = value.into();
        let mut r = Self::of_kind(RefKind::Scalar);
        r.dim = value.len();
        r.equation = Some(Expr::Const { value });
        r
    }

    pub fn equation(mut self, equation: impl Into<Expr>) -> Self {
        self.equation = Some(equation.into());
        self
    }

    pub fn init(mut self, value: impl Into<Value>) -> Self {
        self.init = Some(FreeValue::Fixed(value.into()));
        self
    }

    pub fn init_prior(mut self, prior: Distribution) -> Self {
        self.init = Some(FreeValue::Prior(prior));
        self
    }

    pub fn min(mut self, bound: impl Into<Expr>) -> Self {
        self.min = Some(bound.into());
        self
    }

    pub fn max(mut self, bound: impl Into<Expr>) -> Self {
        self.max = Some(bound.into());
        self
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// User-tunable: a prior, or an equation that is a bare constant.
    pub fn is_free(&self) -> bool {
        self.kind == RefKind::Variable
            && (self.prior.is_some() || self.equation.as_ref().is_some_and(|e| e.as_constant().is_some()))
    }
}

/// Copyable handle to a registered Reference, used as an expression leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref(pub(crate) RefKey);

impl Ref {
    pub fn key(&self) -> RefKey { self.0 }

    pub fn expr(self) -> Expr { Expr::Ref { target: self.0 } }

    /// Value `lag` steps ago, `default` before that.
    pub fn delay(self, lag: usize, default: impl Into<Expr>) -> Expr {
        Expr::Delay { of: self.0, lag, default: Box::new(default.into()) }
    }

    /// Recorded value at `index`; negative indices count from the end.
    pub fn index(self, index: i64) -> Expr { Expr::SeriesIndex { of: self.0, index } }

    pub fn series_min(self) -> Expr { Expr::SeriesReduce { kind: ReduceOp::Min, of: self.0 } }
    pub fn series_max(self) -> Expr { Expr::SeriesReduce { kind: ReduceOp::Max, of: self.0 } }
    pub fn series_sum(self) -> Expr { Expr::SeriesReduce { kind: ReduceOp::Sum, of: self.0 } }
    pub fn series_mean(self) -> Expr { Expr::SeriesReduce { kind: ReduceOp::Mean, of: self.0 } }
}

impl From<Ref> for Expr {
    fn from(r: Ref) -> Self { r.expr() }
}

impl From<&Ref> for Expr {
    fn from(r: &Ref) -> Self { r.expr() }
}
