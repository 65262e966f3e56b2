//! Expression builder functions.
//!
//! ```
//! use stockflow_core::graph::ops::*;
//! use stockflow_core::graph::Expr;
//!
//! let t: Expr = Expr::constant(3.0);
//! let wave = sin(t.clone()).mul(2.0).add(repeated_pulse(0.0, 4.0));
//! assert!(matches!(wave, Expr::Binary { .. }));
//! ```

use super::expr::{Expr, MathFn, ReduceOp};
use super::reference::Ref;

fn math(func: MathFn, x: impl Into<Expr>) -> Expr { Expr::Unary { func, arg: Box::new(x.into()) } }

pub fn abs(x: impl Into<Expr>) -> Expr { math(MathFn::Abs, x) }
pub fn sin(x: impl Into<Expr>) -> Expr { math(MathFn::Sin, x) }
pub fn cos(x: impl Into<Expr>) -> Expr { math(MathFn::Cos, x) }
pub fn tan(x: impl Into<Expr>) -> Expr { math(MathFn::Tan, x) }
pub fn exp(x: impl Into<Expr>) -> Expr { math(MathFn::Exp, x) }
pub fn log(x: impl Into<Expr>) -> Expr { math(MathFn::Log, x) }
pub fn sqrt(x: impl Into<Expr>) -> Expr { math(MathFn::Sqrt, x) }
pub fn floor(x: impl Into<Expr>) -> Expr { math(MathFn::Floor, x) }
pub fn ceil(x: impl Into<Expr>) -> Expr { math(MathFn::Ceil, x) }
pub fn round(x: impl Into<Expr>) -> Expr { math(MathFn::Round, x) }

/// Elementwise minimum of two expressions.
pub fn min(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr { a.into().min(b) }
pub fn max(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr { a.into().max(b) }

/// `(branch, condition)` pairs; per element the first true condition
/// selects its branch, and 0 is produced where none is true.
pub fn piecewise<B, C>(arms: impl IntoIterator<Item = (B, C)>) -> Expr
where
    B: Into<Expr>,
    C: Into<Expr>,
{
    let (branches, conditions) = arms.into_iter().map(|(b, c)| (b.into(), c.into())).unzip();
    Expr::Piecewise { branches, conditions }
}

/// Lookup table; `xs` must be strictly increasing.
pub fn interpolate(x: impl Into<Expr>, xs: Vec<f64>, ys: Vec<f64>) -> Expr {
    Expr::Interpolate { x: Box::new(x.into()), xs, ys }
}

pub fn repeated_pulse(start: impl Into<Expr>, interval: impl Into<Expr>) -> Expr {
    Expr::Pulse { start: Box::new(start.into()), interval: Box::new(interval.into()) }
}

pub fn delay(of: Ref, lag: usize, default: impl Into<Expr>) -> Expr { of.delay(lag, default) }

fn reduce(kind: ReduceOp, x: impl Into<Expr>) -> Expr { Expr::Reduce { kind, arg: Box::new(x.into()) } }

/// Sum over the vector dimension.
pub fn sum(x: impl Into<Expr>) -> Expr { reduce(ReduceOp::Sum, x) }
pub fn mean(x: impl Into<Expr>) -> Expr { reduce(ReduceOp::Mean, x) }
pub fn minimum(x: impl Into<Expr>) -> Expr { reduce(ReduceOp::Min, x) }
pub fn maximum(x: impl Into<Expr>) -> Expr { reduce(ReduceOp::Max, x) }
