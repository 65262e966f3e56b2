//! Hybrid scalar/vector storage for a single Reference at a single step.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Inline storage for vector values; most models use fewer than five elements.
pub type Elements = SmallVec<[f64; 4]>;

/// The atomic unit of data in the engine.
///
/// A scalar broadcasts against a vector of any length. Constructors normalise
/// single-element vectors to `Scalar`, so equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Vector(Elements),
}

impl Default for Value {
    fn default() -> Self { Value::Scalar(0.0) }
}

impl Value {
    pub fn from_vec(values: Vec<f64>) -> Self {
        if values.len() == 1 {
            Value::Scalar(values[0])
        } else {
            Value::Vector(Elements::from_vec(values))
        }
    }

    pub fn filled(value: f64, dim: usize) -> Self {
        if dim <= 1 {
            Value::Scalar(value)
        } else {
            Value::Vector(smallvec::smallvec![value; dim])
        }
    }

    pub fn len(&self) -> usize {
        match self { Value::Scalar(_) => 1, Value::Vector(v) => v.len() }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Element `i`, repeating the scalar for every index.
    #[inline(always)]
    pub fn get_at(&self, i: usize) -> f64 {
        match self {
            Value::Scalar(s) => *s,
            Value::Vector(v) => v.get(i).copied().unwrap_or(f64::NAN),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.get_at(i))
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self { Value::Scalar(s) => vec![*s], Value::Vector(v) => v.to_vec() }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(f(*s)),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| f(*x)).collect()),
        }
    }

    pub fn is_finite(&self) -> bool { self.iter().all(f64::is_finite) }
}

/// Length of the broadcast of two operands, `None` when incompatible.
pub fn broadcast_len(lhs: usize, rhs: usize) -> Option<usize> {
    match (lhs, rhs) {
        (a, b) if a == b => Some(a),
        (1, b) => Some(b),
        (a, 1) => Some(a),
        _ => None,
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Scalar(v) }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self { Value::from_vec(v) }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self { Value::from_vec(v.to_vec()) }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_element_vectors_normalise_to_scalars() {
        assert_eq!(Value::from_vec(vec![3.0]), Value::Scalar(3.0));
        assert_eq!(Value::filled(2.0, 1), Value::Scalar(2.0));
        assert_eq!(Value::filled(2.0, 3).to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn scalar_repeats_across_indices() {
        let v = Value::Scalar(4.0);
        assert_eq!(v.get_at(0), 4.0);
        assert_eq!(v.get_at(7), 4.0);
    }

    #[test]
    fn broadcast_rules() {
        assert_eq!(broadcast_len(1, 4), Some(4));
        assert_eq!(broadcast_len(4, 1), Some(4));
        assert_eq!(broadcast_len(3, 3), Some(3));
        assert_eq!(broadcast_len(2, 3), None);
    }

    #[test]
    fn json_shape_is_number_or_array() {
        assert_eq!(serde_json::to_string(&Value::Scalar(1.5)).unwrap(), "1.5");
        let v: Value = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(v.to_vec(), vec![1.0, 2.0]);
    }
}
