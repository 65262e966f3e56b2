//! Immutable expression trees.
//!
//! An `Expr` is a plain tagged tree: one variant per operator kind, leaves are
//! literal values or Reference identifiers. Building a tree never evaluates
//! it; the simulation engine and the probabilistic compiler both walk the same
//! tree through `compute::eval`.
//!
//! The leaf type is generic so one tree shape serves three stages:
//! `Expr<RefKey>` while authoring, `Expr<NodeId>` once flattened, and
//! `Expr<String>` inside serialized records.

use crate::store::{RefKey, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Euclidean remainder.
    Mod,
    Pow,
    Min,
    Max,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    fn is_call(&self) -> bool { matches!(self, BinaryOp::Min | BinaryOp::Max) }
}

/// Elementwise math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathFn {
    Neg,
    Not,
    Abs,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Floor,
    Ceil,
    Round,
}

impl MathFn {
    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Neg => "neg",
            MathFn::Not => "not",
            MathFn::Abs => "abs",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Sqrt => "sqrt",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Round => "round",
        }
    }
}

/// Reductions, across the vector dimension (`Reduce`) or across time (`SeriesReduce`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    Sum,
    Mean,
    Min,
    Max,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr<R = RefKey> {
    Const { value: Value },
    Ref { target: R },
    Binary { kind: BinaryOp, lhs: Box<Expr<R>>, rhs: Box<Expr<R>> },
    Unary { func: MathFn, arg: Box<Expr<R>> },
    /// First branch whose condition is non-zero, per element; 0 when none match.
    Piecewise { branches: Vec<Expr<R>>, conditions: Vec<Expr<R>> },
    /// Piecewise-linear lookup; `xs` strictly increasing, clamped at both ends.
    Interpolate { x: Box<Expr<R>>, xs: Vec<f64>, ys: Vec<f64> },
    /// 1 at `start, start + interval, ...`, 0 elsewhere.
    Pulse { start: Box<Expr<R>>, interval: Box<Expr<R>> },
    /// Value of `of` at `t - lag`, or `default` while `t < lag`.
    Delay { of: R, lag: usize, default: Box<Expr<R>> },
    Reduce { kind: ReduceOp, arg: Box<Expr<R>> },
    /// Element of a recorded series; negative indices count from the end.
    SeriesIndex { of: R, index: i64 },
    SeriesReduce { kind: ReduceOp, of: R },
}

/// How an expression reads one of its References.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefUse {
    /// Value at the current step; creates a same-step dependency.
    Current,
    /// Value from an earlier step.
    Lagged,
    /// The whole recorded series.
    Series,
}

impl<R> Expr<R> {
    pub fn constant(value: impl Into<Value>) -> Self { Expr::Const { value: value.into() } }

    pub fn reference(target: R) -> Self { Expr::Ref { target } }

    pub fn as_constant(&self) -> Option<&Value> {
        match self { Expr::Const { value } => Some(value), _ => None }
    }

    /// Rebuilds the tree with every Reference identifier mapped through `f`.
    pub fn map_refs<S, E>(&self, f: &mut impl FnMut(&R) -> Result<S, E>) -> Result<Expr<S>, E> {
        Ok(match self {
            Expr::Const { value } => Expr::Const { value: value.clone() },
            Expr::Ref { target } => Expr::Ref { target: f(target)? },
            Expr::Binary { kind, lhs, rhs } => Expr::Binary {
                kind: *kind,
                lhs: Box::new(lhs.map_refs(f)?),
                rhs: Box::new(rhs.map_refs(f)?),
            },
            Expr::Unary { func, arg } => Expr::Unary { func: *func, arg: Box::new(arg.map_refs(f)?) },
            Expr::Piecewise { branches, conditions } => {
                let mut mapped_branches = Vec::with_capacity(branches.len());
                for b in branches {
                    mapped_branches.push(b.map_refs(f)?);
                }
                let mut mapped_conditions = Vec::with_capacity(conditions.len());
                for c in conditions {
                    mapped_conditions.push(c.map_refs(f)?);
                }
                Expr::Piecewise { branches: mapped_branches, conditions: mapped_conditions }
            }
            Expr::Interpolate { x, xs, ys } => Expr::Interpolate {
                x: Box::new(x.map_refs(f)?),
                xs: xs.clone(),
                ys: ys.clone(),
            },
            Expr::Pulse { start, interval } => Expr::Pulse {
                start: Box::new(start.map_refs(f)?),
                interval: Box::new(interval.map_refs(f)?),
            },
            Expr::Delay { of, lag, default } => Expr::Delay {
                of: f(of)?,
                lag: *lag,
                default: Box::new(default.map_refs(f)?),
            },
            Expr::Reduce { kind, arg } => Expr::Reduce { kind: *kind, arg: Box::new(arg.map_refs(f)?) },
            Expr::SeriesIndex { of, index } => Expr::SeriesIndex { of: f(of)?, index: *index },
            Expr::SeriesReduce { kind, of } => Expr::SeriesReduce { kind: *kind, of: f(of)? },
        })
    }

    /// Calls `f` for every Reference read, together with how it is read.
    pub fn visit_refs(&self, f: &mut impl FnMut(&R, RefUse)) {
        match self {
            Expr::Const { .. } => {}
            Expr::Ref { target } => f(target, RefUse::Current),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_refs(f);
                rhs.visit_refs(f);
            }
            Expr::Unary { arg, .. } | Expr::Reduce { arg, .. } => arg.visit_refs(f),
            Expr::Piecewise { branches, conditions } => {
                for e in branches.iter().chain(conditions.iter()) {
                    e.visit_refs(f);
                }
            }
            Expr::Interpolate { x, .. } => x.visit_refs(f),
            Expr::Pulse { start, interval } => {
                start.visit_refs(f);
                interval.visit_refs(f);
            }
            Expr::Delay { of, lag, default } => {
                // lag 0 reads this step's value
                f(of, if *lag == 0 { RefUse::Current } else { RefUse::Lagged });
                default.visit_refs(f);
            }
            Expr::SeriesIndex { of, .. } | Expr::SeriesReduce { of, .. } => f(of, RefUse::Series),
        }
    }

    /// Calls `f` on every node of the tree, parents first.
    pub fn visit_nodes(&self, f: &mut impl FnMut(&Expr<R>)) {
        f(self);
        match self {
            Expr::Const { .. } | Expr::Ref { .. } | Expr::SeriesIndex { .. } | Expr::SeriesReduce { .. } => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_nodes(f);
                rhs.visit_nodes(f);
            }
            Expr::Unary { arg, .. } | Expr::Reduce { arg, .. } => arg.visit_nodes(f),
            Expr::Piecewise { branches, conditions } => {
                for e in branches.iter().chain(conditions.iter()) {
                    e.visit_nodes(f);
                }
            }
            Expr::Interpolate { x, .. } => x.visit_nodes(f),
            Expr::Pulse { start, interval } => {
                start.visit_nodes(f);
                interval.visit_nodes(f);
            }
            Expr::Delay { default, .. } => default.visit_nodes(f),
        }
    }

    /// Calls `f` for every interpolation table in the tree.
    pub fn visit_tables(&self, f: &mut impl FnMut(&[f64], &[f64])) {
        self.visit_nodes(&mut |node| {
            if let Expr::Interpolate { xs, ys, .. } = node {
                f(xs, ys);
            }
        });
    }

    pub fn uses_series(&self) -> bool {
        let mut found = false;
        self.visit_refs(&mut |_, usage| found |= usage == RefUse::Series);
        found
    }

    /// Human-readable equation text, naming leaves through `name`.
    pub fn render(&self, name: &impl Fn(&R) -> String) -> String {
        match self {
            Expr::Const { value } => value.to_string(),
            Expr::Ref { target } => name(target),
            Expr::Binary { kind, lhs, rhs } if kind.is_call() => {
                format!("{}({}, {})", kind.symbol(), lhs.render(name), rhs.render(name))
            }
            Expr::Binary { kind, lhs, rhs } => {
                format!("({} {} {})", lhs.render(name), kind.symbol(), rhs.render(name))
            }
            Expr::Unary { func: MathFn::Neg, arg } => format!("-{}", arg.render(name)),
            Expr::Unary { func, arg } => format!("{}({})", func.name(), arg.render(name)),
            Expr::Piecewise { branches, conditions } => {
                let arms: Vec<String> = branches
                    .iter()
                    .zip(conditions)
                    .map(|(b, c)| format!("{} if {}", b.render(name), c.render(name)))
                    .collect();
                format!("piecewise[{}]", arms.join("; "))
            }
            Expr::Interpolate { x, xs, ys } => {
                format!("interpolate({}, {:?}, {:?})", x.render(name), xs, ys)
            }
            Expr::Pulse { start, interval } => {
                format!("repeated_pulse({}, {})", start.render(name), interval.render(name))
            }
            Expr::Delay { of, lag, default } => {
                format!("delay({}, {}, {})", name(of), lag, default.render(name))
            }
            Expr::Reduce { kind, arg } => format!("{}({})", kind.name(), arg.render(name)),
            Expr::SeriesIndex { of, index } => format!("{}[{}]", name(of), index),
            Expr::SeriesReduce { kind, of } => format!("{}.series_{}()", name(of), kind.name()),
        }
    }
}

impl fmt::Display for Expr<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&|n: &String| n.clone()))
    }
}

/// Explicit builder methods; each returns a new tree node.
#[allow(clippy::should_implement_trait)]
impl Expr<RefKey> {
    fn binary(self, kind: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary { kind, lhs: Box::new(self), rhs: Box::new(rhs.into()) }
    }

    fn unary(self, func: MathFn) -> Expr { Expr::Unary { func, arg: Box::new(self) } }

    pub fn add(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Add, rhs) }
    pub fn sub(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Sub, rhs) }
    pub fn mul(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Mul, rhs) }
    pub fn div(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Div, rhs) }
    pub fn rem(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Mod, rhs) }
    pub fn pow(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Pow, rhs) }
    pub fn min(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Min, rhs) }
    pub fn max(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Max, rhs) }
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Lt, rhs) }
    pub fn le(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Le, rhs) }
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Gt, rhs) }
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Ge, rhs) }
    pub fn equals(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Eq, rhs) }
    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Ne, rhs) }
    pub fn and(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::And, rhs) }
    pub fn or(self, rhs: impl Into<Expr>) -> Expr { self.binary(BinaryOp::Or, rhs) }
    pub fn not(self) -> Expr { self.unary(MathFn::Not) }
    pub fn neg(self) -> Expr { self.unary(MathFn::Neg) }
    pub fn apply(self, func: MathFn) -> Expr { self.unary(func) }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self { Expr::constant(v) }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self { Expr::constant(v as f64) }
}

impl From<Vec<f64>> for Expr {
    fn from(v: Vec<f64>) -> Self { Expr::constant(v) }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self { Expr::Const { value: v } }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(e: &Expr<String>) -> String { e.to_string() }

    #[test]
    fn renders_nested_equation() {
        let e: Expr<String> = Expr::Binary {
            kind: BinaryOp::Add,
            lhs: Box::new(Expr::Unary { func: MathFn::Sin, arg: Box::new(Expr::reference("t".to_string())) }),
            rhs: Box::new(Expr::constant(2.0)),
        };
        assert_eq!(named(&e), "(sin(t) + 2)");
    }

    #[test]
    fn visit_refs_reports_usage() {
        let e: Expr<u32> = Expr::Binary {
            kind: BinaryOp::Add,
            lhs: Box::new(Expr::Delay { of: 1, lag: 1, default: Box::new(Expr::reference(2)) }),
            rhs: Box::new(Expr::SeriesIndex { of: 3, index: -1 }),
        };
        let mut seen = Vec::new();
        e.visit_refs(&mut |r, usage| seen.push((*r, usage)));
        assert_eq!(seen, vec![(1, RefUse::Lagged), (2, RefUse::Current), (3, RefUse::Series)]);
        assert!(e.uses_series());
    }

    #[test]
    fn zero_lag_delay_is_a_current_read() {
        let e: Expr<u32> = Expr::Delay { of: 7, lag: 0, default: Box::new(Expr::constant(0.0)) };
        let mut seen = Vec::new();
        e.visit_refs(&mut |r, usage| seen.push((*r, usage)));
        assert_eq!(seen, vec![(7, RefUse::Current)]);
    }

    #[test]
    fn map_refs_preserves_shape() {
        let e: Expr<u32> = Expr::Pulse { start: Box::new(Expr::reference(4)), interval: Box::new(Expr::constant(8.0)) };
        let mapped: Expr<String> = e.map_refs(&mut |r| Ok::<_, ()>(format!("v{}", r))).unwrap();
        assert_eq!(mapped.to_string(), "repeated_pulse(v4, 8)");
    }

    #[test]
    fn serde_uses_op_tag() {
        let e: Expr<String> = Expr::SeriesIndex { of: "level".into(), index: -1 };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"op":"series_index","of":"level","index":-1}"#);
        let back: Expr<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
