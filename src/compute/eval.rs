//! The shared recursive evaluator.
//!
//! One walk over `Expr<NodeId>` serves both interpretations of a model: a
//! `Domain` supplies the primitive operations, either on concrete `Value`s
//! (`Numeric`) or by recording nodes for an inference engine.

use super::kernel;
use super::ledger::{Ledger, NumericFault};
use crate::graph::{BinaryOp, Expr, MathFn, ReduceOp};
use crate::store::{Distribution, NodeId, RefKind, Registry, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Primitive operations of one evaluation semantics.
pub trait Domain {
    type Val: Clone;

    fn constant(&mut self, value: &Value) -> Result<Self::Val, NumericFault>;
    fn binary(&mut self, op: BinaryOp, lhs: &Self::Val, rhs: &Self::Val) -> Result<Self::Val, NumericFault>;
    fn unary(&mut self, func: MathFn, arg: &Self::Val) -> Result<Self::Val, NumericFault>;
    fn reduce(&mut self, op: ReduceOp, arg: &Self::Val) -> Result<Self::Val, NumericFault>;
    fn interpolate(&mut self, x: &Self::Val, xs: &[f64], ys: &[f64]) -> Result<Self::Val, NumericFault>;
    fn select(&mut self, branches: &[Self::Val], conditions: &[Self::Val]) -> Result<Self::Val, NumericFault>;

    /// A free quantity of `dim` iid elements drawn from `dist`. Called once
    /// per run for each prior.
    fn prior(&mut self, name: &str, dist: &Distribution, dim: usize) -> Result<Self::Val, NumericFault>;
}

/// Concrete IEEE-754 evaluation with a per-run random stream.
pub struct Numeric {
    rng: StdRng,
}

impl Numeric {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Domain for Numeric {
    type Val = Value;

    fn constant(&mut self, value: &Value) -> Result<Value, NumericFault> { Ok(value.clone()) }

    fn binary(&mut self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, NumericFault> {
        kernel::binary(op, lhs, rhs)
    }

    fn unary(&mut self, func: MathFn, arg: &Value) -> Result<Value, NumericFault> { kernel::unary(func, arg) }

    fn reduce(&mut self, op: ReduceOp, arg: &Value) -> Result<Value, NumericFault> { kernel::reduce(op, arg) }

    fn interpolate(&mut self, x: &Value, xs: &[f64], ys: &[f64]) -> Result<Value, NumericFault> {
        Ok(kernel::interpolate(x, xs, ys))
    }

    fn select(&mut self, branches: &[Value], conditions: &[Value]) -> Result<Value, NumericFault> {
        kernel::select(branches, conditions)
    }

    fn prior(&mut self, _name: &str, dist: &Distribution, dim: usize) -> Result<Value, NumericFault> {
        let draws: Vec<f64> = (0..dim.max(1)).map(|_| dist.sample(&mut self.rng)).collect();
        Ok(Value::from_vec(draws))
    }
}

/// Which view of the ledger a plain Reference leaf reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Value at the current step.
    Step,
    /// Final recorded value; Metric leaves read the Metric.
    Metric,
}

pub struct Evaluator<'a, V> {
    registry: &'a Registry,
    ledger: &'a Ledger<V>,
    t: usize,
    phase: Phase,
}

impl<'a, V: Clone> Evaluator<'a, V> {
    /// Evaluates step equations at step `t`.
    pub fn at_step(registry: &'a Registry, ledger: &'a Ledger<V>, t: usize) -> Self {
        Self { registry, ledger, t, phase: Phase::Step }
    }

    /// Evaluates Metric equations after a run of `steps` steps.
    pub fn after_run(registry: &'a Registry, ledger: &'a Ledger<V>, steps: usize) -> Self {
        Self { registry, ledger, t: steps, phase: Phase::Metric }
    }

    fn read(&self, id: NodeId) -> Result<V, NumericFault> {
        let found = match (self.phase, self.registry.kind(id)) {
            (_, RefKind::Metric) => self.ledger.metric(id),
            (Phase::Step, _) => self.ledger.at(id, self.t),
            (Phase::Metric, _) => self.ledger.last(id),
        };
        // Unreachable for a resolved schedule.
        found.cloned().ok_or(NumericFault::IndexOutOfRange { index: self.t as i64, len: self.ledger.series(id).len() })
    }

    pub fn eval<D: Domain<Val = V>>(&self, domain: &mut D, expr: &Expr<NodeId>) -> Result<V, NumericFault> {
        match expr {
            Expr::Const { value } => domain.constant(value),
            Expr::Ref { target } => self.read(*target),
            Expr::Binary { kind, lhs, rhs } => {
                let l = self.eval(domain, lhs)?;
                let r = self.eval(domain, rhs)?;
                domain.binary(*kind, &l, &r)
            }
            Expr::Unary { func, arg } => {
                let a = self.eval(domain, arg)?;
                domain.unary(*func, &a)
            }
            Expr::Piecewise { branches, conditions } => {
                let mut bs = Vec::with_capacity(branches.len());
                for b in branches {
                    bs.push(self.eval(domain, b)?);
                }
                let mut cs = Vec::with_capacity(conditions.len());
                for c in conditions {
                    cs.push(self.eval(domain, c)?);
                }
                domain.select(&bs, &cs)
            }
            Expr::Interpolate { x, xs, ys } => {
                let x = self.eval(domain, x)?;
                domain.interpolate(&x, xs, ys)
            }
            Expr::Pulse { start, interval } => {
                // 1 where t >= start and (t - start) mod interval == 0
                let t = domain.constant(&Value::Scalar(self.t as f64))?;
                let start = self.eval(domain, start)?;
                let interval = self.eval(domain, interval)?;
                let zero = domain.constant(&Value::Scalar(0.0))?;
                let offset = domain.binary(BinaryOp::Sub, &t, &start)?;
                let phase = domain.binary(BinaryOp::Mod, &offset, &interval)?;
                let on_beat = domain.binary(BinaryOp::Eq, &phase, &zero)?;
                let started = domain.binary(BinaryOp::Ge, &t, &start)?;
                domain.binary(BinaryOp::Mul, &on_beat, &started)
            }
            Expr::Delay { of, lag, default } => {
                let t = self.t;
                if t < *lag {
                    return self.eval(domain, default);
                }
                self.ledger
                    .at(*of, t - lag)
                    .cloned()
                    .ok_or(NumericFault::IndexOutOfRange { index: (t - lag) as i64, len: self.ledger.series(*of).len() })
            }
            Expr::Reduce { kind, arg } => {
                let a = self.eval(domain, arg)?;
                domain.reduce(*kind, &a)
            }
            Expr::SeriesIndex { of, index } => {
                let series = self.ledger.series(*of);
                let len = series.len();
                let resolved = if *index < 0 { len as i64 + index } else { *index };
                if resolved < 0 || resolved >= len as i64 {
                    return Err(NumericFault::IndexOutOfRange { index: *index, len });
                }
                Ok(series[resolved as usize].clone())
            }
            Expr::SeriesReduce { kind, of } => {
                let series = self.ledger.series(*of);
                let (first, rest) = series
                    .split_first()
                    .ok_or(NumericFault::IndexOutOfRange { index: 0, len: 0 })?;
                let fold_op = match kind {
                    ReduceOp::Sum | ReduceOp::Mean => BinaryOp::Add,
                    ReduceOp::Min => BinaryOp::Min,
                    ReduceOp::Max => BinaryOp::Max,
                };
                let mut acc = first.clone();
                for v in rest {
                    acc = domain.binary(fold_op, &acc, v)?;
                }
                if *kind == ReduceOp::Mean {
                    let n = domain.constant(&Value::Scalar(series.len() as f64))?;
                    acc = domain.binary(BinaryOp::Div, &acc, &n)?;
                }
                Ok(acc)
            }
        }
    }
}
