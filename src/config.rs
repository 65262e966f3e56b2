//! Run and inference configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What a multi-repetition run does when one repetition faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failed repetition fails the whole run.
    #[default]
    Abort,
    /// Failed repetitions are dropped and reported in the trace.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Overrides the model's default step count.
    pub steps: Option<usize>,
    pub repetitions: usize,
    pub seed: u64,
    pub failure_policy: FailurePolicy,
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { steps: None, repetitions: 1, seed: 0, failure_policy: FailurePolicy::Abort, parallel: true }
    }
}

impl RunConfig {
    pub fn new(steps: usize, repetitions: usize) -> Self {
        Self { steps: Some(steps), repetitions, ..Self::default() }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> { serde_json::from_str(json) }

    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self::from_json(&fs::read_to_string(path)?)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    pub draws: usize,
    /// Adaptation iterations discarded before `draws` are kept.
    pub tune: usize,
    pub seed: u64,
    pub steps: Option<usize>,
    /// Starting random-walk step, as a fraction of each prior's natural scale.
    pub initial_scale: f64,
    pub target_acceptance: f64,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self { draws: 1000, tune: 1000, seed: 0, steps: None, initial_scale: 0.5, target_acceptance: 0.3 }
    }
}

impl InferConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> { serde_json::from_str(json) }

    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self::from_json(&fs::read_to_string(path)?)?)
    }
}

/// Seed of repetition `rep` in a run seeded `seed` (SplitMix64 finaliser).
pub fn repetition_seed(seed: u64, rep: usize) -> u64 {
    let mut z = seed ^ (rep as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = RunConfig::from_json(r#"{"repetitions": 8, "failure_policy": "skip"}"#).unwrap();
        assert_eq!(cfg.repetitions, 8);
        assert_eq!(cfg.failure_policy, FailurePolicy::Skip);
        assert!(cfg.parallel);
        assert_eq!(cfg.steps, None);

        let inf = InferConfig::from_json("{}").unwrap();
        assert_eq!(inf, InferConfig::default());
    }

    #[test]
    fn repetition_seeds_differ() {
        let seeds: std::collections::HashSet<u64> = (0..100).map(|r| repetition_seed(42, r)).collect();
        assert_eq!(seeds.len(), 100);
        assert_eq!(repetition_seed(42, 3), repetition_seed(42, 3));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"steps": 12, "seed": 9}"#).unwrap();
        let cfg = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.steps, Some(12));
        assert_eq!(cfg.seed, 9);
    }
}
