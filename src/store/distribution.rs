//! Prior distributions for free References.

use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum Distribution {
    Normal { mu: f64, sigma: f64 },
    Uniform { lower: f64, upper: f64 },
    /// Integers in `lower..=upper`.
    DiscreteUniform { lower: i64, upper: i64 },
    Bernoulli { p: f64 },
}

impl Distribution {
    pub fn normal(mu: f64, sigma: f64) -> Self { Distribution::Normal { mu, sigma } }
    pub fn uniform(lower: f64, upper: f64) -> Self { Distribution::Uniform { lower, upper } }
    pub fn discrete_uniform(lower: i64, upper: i64) -> Self { Distribution::DiscreteUniform { lower, upper } }
    pub fn bernoulli(p: f64) -> Self { Distribution::Bernoulli { p } }

    /// Checks parameters; the message names the offending one.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Distribution::Normal { mu, sigma } => {
                if !mu.is_finite() { return Err(format!("mu must be finite, got {}", mu)); }
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(format!("sigma must be positive and finite, got {}", sigma));
                }
            }
            Distribution::Uniform { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                    return Err(format!("requires finite lower < upper, got [{}, {}]", lower, upper));
                }
            }
            Distribution::DiscreteUniform { lower, upper } => {
                if lower > upper {
                    return Err(format!("requires lower <= upper, got [{}, {}]", lower, upper));
                }
            }
            Distribution::Bernoulli { p } => {
                if !(0.0..=1.0).contains(&p) {
                    return Err(format!("p must lie in [0, 1], got {}", p));
                }
            }
        }
        Ok(())
    }

    /// Draws one element. Parameters are assumed valid.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Distribution::Normal { mu, sigma } => match Normal::new(mu, sigma) {
                Ok(normal) => normal.sample(rng),
                Err(_) => f64::NAN,
            },
            Distribution::Uniform { lower, upper } => rng.random_range(lower..upper),
            Distribution::DiscreteUniform { lower, upper } => rng.random_range(lower..=upper) as f64,
            Distribution::Bernoulli { p } => if rng.random_bool(p) { 1.0 } else { 0.0 },
        }
    }

    /// Log density (or log mass) at `x`; `-inf` outside the support.
    pub fn log_density(&self, x: f64) -> f64 {
        match *self {
            Distribution::Normal { mu, sigma } => {
                let z = (x - mu) / sigma;
                -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * PI).ln()
            }
            Distribution::Uniform { lower, upper } => {
                if x >= lower && x < upper { -(upper - lower).ln() } else { f64::NEG_INFINITY }
            }
            Distribution::DiscreteUniform { lower, upper } => {
                let in_support = x.fract() == 0.0 && x >= lower as f64 && x <= upper as f64;
                if in_support { -((upper - lower + 1) as f64).ln() } else { f64::NEG_INFINITY }
            }
            Distribution::Bernoulli { p } => {
                if x == 1.0 { p.ln() } else if x == 0.0 { (1.0 - p).ln() } else { f64::NEG_INFINITY }
            }
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Normal { mu, .. } => mu,
            Distribution::Uniform { lower, upper } => 0.5 * (lower + upper),
            Distribution::DiscreteUniform { lower, upper } => 0.5 * (lower + upper) as f64,
            Distribution::Bernoulli { p } => p,
        }
    }

    /// Natural step size for a random-walk proposal over this support.
    pub fn proposal_scale(&self) -> f64 {
        match *self {
            Distribution::Normal { sigma, .. } => sigma,
            Distribution::Uniform { lower, upper } => (upper - lower) / 4.0,
            Distribution::DiscreteUniform { lower, upper } => (((upper - lower) as f64) / 4.0).max(1.0),
            Distribution::Bernoulli { .. } => 1.0,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Normal { mu, sigma } => write!(f, "Normal({}, {})", mu, sigma),
            Distribution::Uniform { lower, upper } => write!(f, "Uniform({}, {})", lower, upper),
            Distribution::DiscreteUniform { lower, upper } => write!(f, "DiscreteUniform({}, {})", lower, upper),
            Distribution::Bernoulli { p } => write!(f, "Bernoulli({})", p),
        }
    }
}
