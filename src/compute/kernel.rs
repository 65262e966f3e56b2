//! Elementwise numeric kernels over `Value`.
//!
//! The scalar functions are shared with the tape replay in `solver::tape`, so
//! a fault raised by the simulator is raised identically by the sampler.

use super::ledger::NumericFault;
use crate::graph::{BinaryOp, MathFn, ReduceOp};
use crate::store::{broadcast_len, Elements, Value};

#[inline(always)]
fn truth(x: bool) -> f64 {
    if x { 1.0 } else { 0.0 }
}

/// Overflow to +-inf (or a NaN from finite inputs) is a fault.
#[inline(always)]
fn finite(v: f64) -> Result<f64, NumericFault> {
    if v.is_finite() { Ok(v) } else { Err(NumericFault::NonFinite) }
}

#[inline]
pub fn apply_binary(op: BinaryOp, l: f64, r: f64) -> Result<f64, NumericFault> {
    finite(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(NumericFault::DivisionByZero);
            }
            l / r
        }
        BinaryOp::Mod => {
            if r == 0.0 {
                return Err(NumericFault::DivisionByZero);
            }
            l.rem_euclid(r)
        }
        BinaryOp::Pow => {
            let v = l.powf(r);
            if v.is_nan() && !l.is_nan() && !r.is_nan() {
                return Err(NumericFault::OutOfDomain { func: "pow", value: l });
            }
            v
        }
        BinaryOp::Min => l.min(r),
        BinaryOp::Max => l.max(r),
        BinaryOp::Lt => truth(l < r),
        BinaryOp::Le => truth(l <= r),
        BinaryOp::Gt => truth(l > r),
        BinaryOp::Ge => truth(l >= r),
        BinaryOp::Eq => truth(l == r),
        BinaryOp::Ne => truth(l != r),
        BinaryOp::And => truth(l != 0.0 && r != 0.0),
        BinaryOp::Or => truth(l != 0.0 || r != 0.0),
    })
}

#[inline]
pub fn apply_unary(func: MathFn, x: f64) -> Result<f64, NumericFault> {
    finite(match func {
        MathFn::Neg => -x,
        MathFn::Not => truth(x == 0.0),
        MathFn::Abs => x.abs(),
        MathFn::Sin => x.sin(),
        MathFn::Cos => x.cos(),
        MathFn::Tan => x.tan(),
        MathFn::Exp => x.exp(),
        MathFn::Log => {
            if x <= 0.0 {
                return Err(NumericFault::OutOfDomain { func: "log", value: x });
            }
            x.ln()
        }
        MathFn::Sqrt => {
            if x < 0.0 {
                return Err(NumericFault::OutOfDomain { func: "sqrt", value: x });
            }
            x.sqrt()
        }
        MathFn::Floor => x.floor(),
        MathFn::Ceil => x.ceil(),
        // half away from zero
        MathFn::Round => x.round(),
    })
}

/// Piecewise-linear lookup, clamped to the end values outside the table.
pub fn lookup(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    // first index with xs[i] > x; 1 <= i < n here
    let i = xs[..n].partition_point(|&v| v <= x);
    let (x0, x1, y0, y1) = (xs[i - 1], xs[i], ys[i - 1], ys[i]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, NumericFault> {
    match (lhs, rhs) {
        (Value::Scalar(l), Value::Scalar(r)) => Ok(Value::Scalar(apply_binary(op, *l, *r)?)),
        _ => {
            let len = broadcast_len(lhs.len(), rhs.len())
                .ok_or(NumericFault::ShapeMismatch { lhs: lhs.len(), rhs: rhs.len() })?;
            let mut out = Elements::with_capacity(len);
            for i in 0..len {
                out.push(apply_binary(op, lhs.get_at(i), rhs.get_at(i))?);
            }
            Ok(Value::Vector(out))
        }
    }
}

pub fn unary(func: MathFn, arg: &Value) -> Result<Value, NumericFault> {
    match arg {
        Value::Scalar(x) => Ok(Value::Scalar(apply_unary(func, *x)?)),
        Value::Vector(v) => {
            let mut out = Elements::with_capacity(v.len());
            for &x in v {
                out.push(apply_unary(func, x)?);
            }
            Ok(Value::Vector(out))
        }
    }
}

/// Folds the vector dimension to a scalar.
pub fn reduce(op: ReduceOp, arg: &Value) -> Result<Value, NumericFault> {
    let n = arg.len() as f64;
    let r = match op {
        ReduceOp::Sum => arg.iter().sum(),
        ReduceOp::Mean => arg.iter().sum::<f64>() / n,
        ReduceOp::Min => arg.iter().fold(f64::INFINITY, f64::min),
        ReduceOp::Max => arg.iter().fold(f64::NEG_INFINITY, f64::max),
    };
    Ok(Value::Scalar(finite(r)?))
}

pub fn interpolate(x: &Value, xs: &[f64], ys: &[f64]) -> Value {
    x.map(|v| lookup(v, xs, ys))
}

/// Per element, the first branch whose condition is non-zero; 0 when none is.
pub fn select(branches: &[Value], conditions: &[Value]) -> Result<Value, NumericFault> {
    let mut len = 1;
    for v in branches.iter().chain(conditions) {
        len = broadcast_len(len, v.len()).ok_or(NumericFault::ShapeMismatch { lhs: len, rhs: v.len() })?;
    }
    let out: Vec<f64> = (0..len)
        .map(|i| {
            branches
                .iter()
                .zip(conditions)
                .find(|(_, c)| c.get_at(i) != 0.0)
                .map(|(b, _)| b.get_at(i))
                .unwrap_or(0.0)
        })
        .collect();
    Ok(Value::from_vec(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn division_by_zero_is_a_fault() {
        let r = binary(BinaryOp::Div, &Value::from(vec![1.0, 2.0]), &Value::from(vec![1.0, 0.0]));
        assert_eq!(r, Err(NumericFault::DivisionByZero));
    }

    #[test]
    fn scalar_broadcasts_against_vector() {
        let r = binary(BinaryOp::Mul, &Value::Scalar(2.0), &Value::from(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(r.to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn incompatible_vectors_fail() {
        let r = binary(BinaryOp::Add, &Value::from(vec![1.0, 2.0]), &Value::from(vec![1.0, 2.0, 3.0]));
        assert_eq!(r, Err(NumericFault::ShapeMismatch { lhs: 2, rhs: 3 }));
    }

    #[test]
    fn overflow_is_a_fault() {
        assert_eq!(apply_unary(MathFn::Exp, 1000.0), Err(NumericFault::NonFinite));
        assert_eq!(apply_binary(BinaryOp::Mul, f64::MAX, 2.0), Err(NumericFault::NonFinite));
        assert_eq!(reduce(ReduceOp::Sum, &Value::from(vec![f64::MAX, f64::MAX])), Err(NumericFault::NonFinite));
    }

    #[rstest]
    #[case(MathFn::Log, 0.0)]
    #[case(MathFn::Log, -1.0)]
    #[case(MathFn::Sqrt, -4.0)]
    fn out_of_domain_inputs(#[case] func: MathFn, #[case] x: f64) {
        assert!(matches!(apply_unary(func, x), Err(NumericFault::OutOfDomain { .. })));
    }

    #[rstest]
    #[case(-1.0, 10.0)]
    #[case(0.0, 10.0)]
    #[case(0.5, 15.0)]
    #[case(1.5, 15.0)]
    #[case(9.0, 10.0)]
    fn lookup_interpolates_and_clamps(#[case] x: f64, #[case] expected: f64) {
        let xs = [0.0, 1.0, 2.0];
        let ys = [10.0, 20.0, 10.0];
        assert!((lookup(x, &xs, &ys) - expected).abs() < 1e-12);
    }

    #[test]
    fn remainder_is_euclidean() {
        assert_eq!(apply_binary(BinaryOp::Mod, -1.0, 3.0).unwrap(), 2.0);
    }

    #[test]
    fn select_takes_first_match_and_defaults_to_zero() {
        let branches = [Value::Scalar(1.0), Value::Scalar(2.0)];
        let conditions = [Value::from(vec![1.0, 0.0, 0.0]), Value::from(vec![1.0, 1.0, 0.0])];
        let r = select(&branches, &conditions).unwrap();
        assert_eq!(r.to_vec(), vec![1.0, 2.0, 0.0]);
    }
}
