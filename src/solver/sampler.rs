//! Samplers over a recorded tape: ancestral draws from the priors and an
//! adaptive component-wise random-walk Metropolis for posteriors.

use super::engine::{CancelToken, SampleRequest};
use super::error::{InferenceError, SamplerDiagnostics};
use super::tape::{Lane, Tape};
use crate::store::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Attempts at finding a finite starting point (or a finite prior draw).
const MAX_INIT_TRIES: usize = 100;
/// Tuning iterations between proposal-scale updates.
const ADAPT_WINDOW: usize = 50;
const MIN_ACCEPTANCE: f64 = 0.01;

/// Gaussian observation of tape slots.
#[derive(Debug, Clone)]
pub struct Likelihood {
    pub lane: Lane,
    pub data: Vec<f64>,
    pub sigma: f64,
}

impl Likelihood {
    /// A scalar lane treats each datum as an iid observation of it.
    fn log_density(&self, values: &[f64]) -> f64 {
        let norm = -self.sigma.ln() - 0.5 * (2.0 * PI).ln();
        self.data
            .iter()
            .enumerate()
            .map(|(k, &y)| {
                let slot = if self.lane.len() == 1 { self.lane[0] } else { self.lane[k] };
                let z = (y - values[slot]) / self.sigma;
                norm - 0.5 * z * z
            })
            .sum()
    }
}

pub struct Target<'a> {
    pub tape: &'a Tape,
    pub priors: &'a [Distribution],
    pub likelihoods: &'a [Likelihood],
}

impl Target<'_> {
    fn draw(&self, rng: &mut StdRng) -> Vec<f64> { self.priors.iter().map(|d| d.sample(rng)).collect() }

    /// Log prior plus (optionally) log likelihood; `None` when the forward
    /// model faults or yields a non-finite output.
    fn log_prob(&self, params: &[f64], values: &mut Vec<f64>, with_likelihood: bool) -> Option<f64> {
        let prior: f64 = self.priors.iter().zip(params).map(|(d, &x)| d.log_density(x)).sum();
        if prior == f64::NEG_INFINITY {
            return Some(prior);
        }
        self.tape.replay(params, values).ok()?;
        if !with_likelihood {
            return Some(prior);
        }
        let mut total = prior;
        for term in self.likelihoods {
            let ll = term.log_density(values);
            if !ll.is_finite() {
                return None;
            }
            total += ll;
        }
        Some(total)
    }
}

fn row(values: &[f64], slots: &[usize]) -> Vec<f64> { slots.iter().map(|&s| values[s]).collect() }

fn all_finite(values: &[f64], slots: &[usize]) -> bool { slots.iter().all(|&s| values[s].is_finite()) }

/// Independent draws from the priors, pushed through the forward model.
pub fn sample_prior(
    target: &Target<'_>,
    slots: &[usize],
    request: &SampleRequest,
    cancel: &CancelToken,
) -> Result<(Vec<Vec<f64>>, SamplerDiagnostics), InferenceError> {
    let mut rng = StdRng::seed_from_u64(request.seed);
    let mut diagnostics = SamplerDiagnostics {
        draws: request.draws,
        seed: request.seed,
        acceptance_rate: 1.0,
        ..Default::default()
    };
    let mut values = Vec::with_capacity(target.tape.len());
    let mut rows = Vec::with_capacity(request.draws);

    for _ in 0..request.draws {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        let mut tries = 0;
        loop {
            let params = target.draw(&mut rng);
            if target.tape.replay(&params, &mut values).is_ok() && all_finite(&values, slots) {
                break;
            }
            diagnostics.numeric_failures += 1;
            tries += 1;
            if tries >= MAX_INIT_TRIES {
                return Err(InferenceError::Divergence { diagnostics });
            }
        }
        rows.push(row(&values, slots));
    }
    Ok((rows, diagnostics))
}

fn propose(rng: &mut StdRng, prior: &Distribution, current: f64, scale: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    match prior {
        Distribution::Bernoulli { .. } => 1.0 - current,
        Distribution::DiscreteUniform { .. } => {
            let step = (z * scale).round();
            if step != 0.0 {
                current + step
            } else if rng.random_bool(0.5) {
                current + 1.0
            } else {
                current - 1.0
            }
        }
        Distribution::Normal { .. } | Distribution::Uniform { .. } => current + z * scale,
    }
}

/// Adaptive random-walk Metropolis, one component at a time.
///
/// Proposal scales start at `initial_scale` times each prior's natural
/// scale and are tuned toward `target_acceptance` during the first `tune`
/// iterations, which are then discarded.
pub fn metropolis(
    target: &Target<'_>,
    slots: &[usize],
    request: &SampleRequest,
    cancel: &CancelToken,
) -> Result<(Vec<Vec<f64>>, SamplerDiagnostics), InferenceError> {
    let mut rng = StdRng::seed_from_u64(request.seed);
    let n = target.priors.len();
    let mut scales: Vec<f64> = target.priors.iter().map(|d| request.initial_scale * d.proposal_scale()).collect();
    let mut diagnostics = SamplerDiagnostics {
        draws: request.draws,
        tune: request.tune,
        seed: request.seed,
        ..Default::default()
    };

    let mut values = Vec::with_capacity(target.tape.len());
    let mut current = Vec::new();
    let mut current_lp = f64::NEG_INFINITY;
    for _ in 0..MAX_INIT_TRIES {
        let params = target.draw(&mut rng);
        match target.log_prob(&params, &mut values, true) {
            Some(lp) if lp.is_finite() => {
                current = params;
                current_lp = lp;
                break;
            }
            Some(_) => diagnostics.rejected += 1,
            None => diagnostics.numeric_failures += 1,
        }
    }
    if !current_lp.is_finite() {
        diagnostics.final_scales = scales;
        return Err(InferenceError::Divergence { diagnostics });
    }
    let mut current_row = row(&values, slots);

    let mut window_accepts = vec![0usize; n];
    let mut accepted = 0usize;
    let mut proposed = 0usize;
    let mut rows = Vec::with_capacity(request.draws);

    for it in 0..request.tune + request.draws {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        let tuning = it < request.tune;
        for j in 0..n {
            let previous = current[j];
            current[j] = propose(&mut rng, &target.priors[j], previous, scales[j]);
            let accept = match target.log_prob(&current, &mut values, true) {
                Some(lp) if lp.is_finite() => {
                    let delta = lp - current_lp;
                    if delta >= 0.0 || rng.random::<f64>().ln() < delta {
                        current_lp = lp;
                        true
                    } else {
                        false
                    }
                }
                Some(_) => false,
                None => {
                    diagnostics.numeric_failures += 1;
                    false
                }
            };
            if accept {
                current_row = row(&values, slots);
                window_accepts[j] += 1;
            } else {
                current[j] = previous;
                diagnostics.rejected += 1;
            }
            if !tuning {
                proposed += 1;
                accepted += accept as usize;
            }
        }

        if tuning && (it + 1) % ADAPT_WINDOW == 0 {
            for (scale, hits) in scales.iter_mut().zip(window_accepts.iter_mut()) {
                let rate = *hits as f64 / ADAPT_WINDOW as f64;
                *scale *= if rate > request.target_acceptance { 1.1 } else { 0.9 };
                *hits = 0;
            }
        }
        if !tuning {
            rows.push(current_row.clone());
        }
    }

    diagnostics.acceptance_rate = if proposed == 0 { 1.0 } else { accepted as f64 / proposed as f64 };
    diagnostics.final_scales = scales;
    debug!(acceptance = diagnostics.acceptance_rate, rejected = diagnostics.rejected, "metropolis finished");
    if n > 0 && diagnostics.acceptance_rate < MIN_ACCEPTANCE {
        warn!(acceptance = diagnostics.acceptance_rate, "sampler acceptance too low");
        return Err(InferenceError::NonConvergence { diagnostics });
    }
    Ok((rows, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Domain;
    use crate::graph::BinaryOp;
    use crate::solver::tape::TapeEngine;
    use crate::store::Value;

    fn request(prior_only: bool) -> SampleRequest {
        SampleRequest { draws: 2000, tune: 1000, seed: 3, prior_only, initial_scale: 0.5, target_acceptance: 0.3 }
    }

    #[test]
    fn likelihood_broadcasts_scalar_lane() {
        let term = Likelihood { lane: smallvec::smallvec![0], data: vec![1.0, 1.0], sigma: 1.0 };
        let single = Likelihood { lane: smallvec::smallvec![0], data: vec![1.0], sigma: 1.0 };
        assert!((term.log_density(&[1.0]) - 2.0 * single.log_density(&[1.0])).abs() < 1e-12);
    }

    #[test]
    fn metropolis_recovers_gaussian_mean() {
        let mut engine = TapeEngine::new();
        let mu = engine.prior("mu", &Distribution::normal(0.0, 10.0), 1).unwrap();
        let one = engine.constant(&Value::Scalar(1.0)).unwrap();
        let out = engine.binary(BinaryOp::Mul, &mu, &one).unwrap();
        let priors = vec![Distribution::normal(0.0, 10.0)];
        let likelihoods = vec![Likelihood { lane: out.clone(), data: vec![4.0; 20], sigma: 1.0 }];
        let target = Target { tape: engine.tape(), priors: &priors, likelihoods: &likelihoods };

        let (rows, diag) = metropolis(&target, &[out[0]], &request(false), &CancelToken::new()).unwrap();
        let mean = rows.iter().map(|r| r[0]).sum::<f64>() / rows.len() as f64;
        assert!((mean - 4.0).abs() < 0.2, "posterior mean {}", mean);
        assert!(diag.acceptance_rate > 0.1);
    }

    #[test]
    fn cancelled_token_returns_no_rows() {
        let priors = vec![Distribution::uniform(0.0, 1.0)];
        let tape = Tape::default();
        let target = Target { tape: &tape, priors: &priors, likelihoods: &[] };
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(sample_prior(&target, &[], &request(true), &cancel).unwrap_err(), InferenceError::Cancelled);
        assert_eq!(metropolis(&target, &[], &request(false), &cancel).unwrap_err(), InferenceError::Cancelled);
    }
}
