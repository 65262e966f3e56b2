//! The bundled inference engine.
//!
//! `TapeEngine` records the compiled forward model as a straight-line tape
//! of scalar operations over free parameters. Operations whose inputs are
//! all constants are folded while recording, so time-dependent branching
//! (pulses, piecewise conditions on `t`) leaves no trace on the tape.

use super::engine::{CancelToken, EngineArray, EngineTrace, InferenceEngine, SampleRequest};
use super::error::InferenceError;
use super::sampler::{self, Likelihood, Target};
use crate::compute::kernel::{apply_binary, apply_unary, lookup};
use crate::compute::{Domain, NumericFault};
use crate::graph::{BinaryOp, MathFn, ReduceOp};
use crate::store::{broadcast_len, Distribution, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::debug;

/// Tape slots of one quantity, one per element.
pub type Lane = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub enum TapeOp {
    Const(f64),
    Param(usize),
    Binary(BinaryOp, usize, usize),
    Unary(MathFn, usize),
    Lookup { x: usize, table: usize },
    /// `(condition, branch)` pairs; the first non-zero condition wins, else 0.
    Select(Vec<(usize, usize)>),
}

#[derive(Debug, Clone, Default)]
pub struct Tape {
    ops: Vec<TapeOp>,
    tables: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Tape {
    pub fn len(&self) -> usize { self.ops.len() }

    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    fn constant_at(&self, slot: usize) -> Option<f64> {
        match self.ops[slot] {
            TapeOp::Const(v) => Some(v),
            _ => None,
        }
    }

    fn push(&mut self, op: TapeOp) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Evaluates every slot for the given parameters into `values`.
    pub fn replay(&self, params: &[f64], values: &mut Vec<f64>) -> Result<(), NumericFault> {
        values.clear();
        values.reserve(self.ops.len());
        for op in &self.ops {
            let v = match op {
                TapeOp::Const(v) => *v,
                TapeOp::Param(i) => params[*i],
                TapeOp::Binary(op, a, b) => apply_binary(*op, values[*a], values[*b])?,
                TapeOp::Unary(func, a) => apply_unary(*func, values[*a])?,
                TapeOp::Lookup { x, table } => {
                    let (xs, ys) = &self.tables[*table];
                    lookup(values[*x], xs, ys)
                }
                TapeOp::Select(arms) => arms
                    .iter()
                    .find(|(c, _)| values[*c] != 0.0)
                    .map(|(_, b)| values[*b])
                    .unwrap_or(0.0),
            };
            values.push(v);
        }
        Ok(())
    }
}

/// One free element on the tape.
#[derive(Debug, Clone)]
struct FreeSlot {
    prior: Distribution,
}

#[derive(Debug, Default)]
pub struct TapeEngine {
    tape: Tape,
    params: Vec<FreeSlot>,
    /// Named free quantities, reported alongside the requested outputs.
    free: Vec<(String, Lane)>,
    outputs: Vec<(String, Lane)>,
    likelihoods: Vec<Likelihood>,
}

impl TapeEngine {
    pub fn new() -> Self { Self::default() }

    pub fn tape(&self) -> &Tape { &self.tape }

    fn constant_slot(&mut self, v: f64) -> usize { self.tape.push(TapeOp::Const(v)) }

    fn binary_slot(&mut self, op: BinaryOp, a: usize, b: usize) -> Result<usize, NumericFault> {
        if let (Some(x), Some(y)) = (self.tape.constant_at(a), self.tape.constant_at(b)) {
            let v = apply_binary(op, x, y)?;
            return Ok(self.constant_slot(v));
        }
        Ok(self.tape.push(TapeOp::Binary(op, a, b)))
    }

    fn unary_slot(&mut self, func: MathFn, a: usize) -> Result<usize, NumericFault> {
        if let Some(x) = self.tape.constant_at(a) {
            let v = apply_unary(func, x)?;
            return Ok(self.constant_slot(v));
        }
        Ok(self.tape.push(TapeOp::Unary(func, a)))
    }

    fn fold(&mut self, op: BinaryOp, lane: &Lane) -> Result<usize, NumericFault> {
        let mut acc = lane[0];
        for &slot in &lane[1..] {
            acc = self.binary_slot(op, acc, slot)?;
        }
        Ok(acc)
    }
}

fn lane_at(lane: &Lane, i: usize) -> usize {
    if lane.len() == 1 { lane[0] } else { lane[i] }
}

impl Domain for TapeEngine {
    type Val = Lane;

    fn constant(&mut self, value: &Value) -> Result<Lane, NumericFault> {
        Ok(value.iter().map(|v| self.constant_slot(v)).collect())
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Lane, rhs: &Lane) -> Result<Lane, NumericFault> {
        let len = broadcast_len(lhs.len(), rhs.len()).ok_or(NumericFault::ShapeMismatch { lhs: lhs.len(), rhs: rhs.len() })?;
        (0..len).map(|i| self.binary_slot(op, lane_at(lhs, i), lane_at(rhs, i))).collect()
    }

    fn unary(&mut self, func: MathFn, arg: &Lane) -> Result<Lane, NumericFault> {
        arg.iter().map(|&a| self.unary_slot(func, a)).collect()
    }

    fn reduce(&mut self, op: ReduceOp, arg: &Lane) -> Result<Lane, NumericFault> {
        let slot = match op {
            ReduceOp::Sum => self.fold(BinaryOp::Add, arg)?,
            ReduceOp::Mean => {
                let sum = self.fold(BinaryOp::Add, arg)?;
                let n = self.constant_slot(arg.len() as f64);
                self.binary_slot(BinaryOp::Div, sum, n)?
            }
            ReduceOp::Min => self.fold(BinaryOp::Min, arg)?,
            ReduceOp::Max => self.fold(BinaryOp::Max, arg)?,
        };
        Ok(smallvec::smallvec![slot])
    }

    fn interpolate(&mut self, x: &Lane, xs: &[f64], ys: &[f64]) -> Result<Lane, NumericFault> {
        let table = self.tape.tables.len();
        self.tape.tables.push((xs.to_vec(), ys.to_vec()));
        Ok(x.iter()
            .map(|&slot| match self.tape.constant_at(slot) {
                Some(v) => self.constant_slot(lookup(v, xs, ys)),
                None => self.tape.push(TapeOp::Lookup { x: slot, table }),
            })
            .collect())
    }

    fn select(&mut self, branches: &[Lane], conditions: &[Lane]) -> Result<Lane, NumericFault> {
        let mut len = 1;
        for lane in branches.iter().chain(conditions) {
            len = broadcast_len(len, lane.len()).ok_or(NumericFault::ShapeMismatch { lhs: len, rhs: lane.len() })?;
        }
        let mut out = Lane::with_capacity(len);
        for i in 0..len {
            let mut arms = Vec::new();
            for (b, c) in branches.iter().zip(conditions) {
                let (b, c) = (lane_at(b, i), lane_at(c, i));
                match self.tape.constant_at(c) {
                    // statically false: skip the arm
                    Some(v) if v == 0.0 => continue,
                    // statically true: later arms are unreachable
                    Some(_) => {
                        arms.push((c, b));
                        break;
                    }
                    None => arms.push((c, b)),
                }
            }
            let slot = match arms.as_slice() {
                [] => self.constant_slot(0.0),
                [(c, b)] if self.tape.constant_at(*c).is_some() => *b,
                _ => self.tape.push(TapeOp::Select(arms)),
            };
            out.push(slot);
        }
        Ok(out)
    }

    fn prior(&mut self, name: &str, dist: &Distribution, dim: usize) -> Result<Lane, NumericFault> {
        let lane: Lane = (0..dim.max(1))
            .map(|_| {
                let index = self.params.len();
                self.params.push(FreeSlot { prior: dist.clone() });
                self.tape.push(TapeOp::Param(index))
            })
            .collect();
        self.free.push((name.to_string(), lane.clone()));
        Ok(lane)
    }
}

impl InferenceEngine for TapeEngine {
    fn deterministic(&mut self, key: &str, value: &Lane) {
        self.outputs.push((key.to_string(), value.clone()));
    }

    fn observe(&mut self, name: &str, value: &Lane, data: &[f64], sigma: f64) -> Result<(), InferenceError> {
        if value.len() > 1 && data.len() != value.len() {
            return Err(InferenceError::MalformedObservation {
                metric: name.to_string(),
                detail: format!("expected {} values for a vector metric, got {}", value.len(), data.len()),
            });
        }
        self.likelihoods.push(Likelihood { lane: value.clone(), data: data.to_vec(), sigma });
        Ok(())
    }

    fn sample(&mut self, request: &SampleRequest, cancel: &CancelToken) -> Result<EngineTrace, InferenceError> {
        let priors: Vec<Distribution> = self.params.iter().map(|p| p.prior.clone()).collect();
        let columns: Vec<&(String, Lane)> = self.outputs.iter().chain(self.free.iter()).collect();
        let slots: Vec<usize> = columns.iter().flat_map(|(_, lane)| lane.iter().copied()).collect();
        debug!(tape = self.tape.len(), params = priors.len(), outputs = columns.len(), "sampling tape");

        let target = Target { tape: &self.tape, priors: &priors, likelihoods: &self.likelihoods };
        let (rows, diagnostics) = if request.prior_only {
            sampler::sample_prior(&target, &slots, request, cancel)?
        } else {
            sampler::metropolis(&target, &slots, request, cancel)?
        };

        let draws = rows.len();
        let mut variables = BTreeMap::new();
        let mut offset = 0;
        for (name, lane) in columns {
            let width = lane.len();
            let mut data = Vec::with_capacity(draws * width);
            for row in &rows {
                data.extend_from_slice(&row[offset..offset + width]);
            }
            offset += width;
            variables.insert(name.clone(), EngineArray { shape: vec![draws, width], data });
        }
        Ok(EngineTrace { draws, variables, diagnostics })
    }
}
