//! Labeled run output.
//!
//! Every Reference becomes a row-major array keyed by qualified name. Series
//! kinds carry `[sample, "t", "dim"]` axes, Metrics and Scalars `[sample, "dim"]`,
//! where the sample axis is `"rep"` for simulations and `"draw"` for
//! inference. Consumers never need to know which produced a trace.

use crate::graph::FlatModel;
use crate::store::{NodeId, RefKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleAxis {
    Repetition,
    Draw,
}

impl SampleAxis {
    pub fn label(&self) -> &'static str {
        match self {
            SampleAxis::Repetition => "rep",
            SampleAxis::Draw => "draw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledArray {
    pub kind: RefKind,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl LabeledArray {
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }

    /// Element at a full index, `None` when out of range.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        let offset: usize = index.iter().zip(self.strides()).map(|(i, s)| i * s).sum();
        self.data.get(offset).copied()
    }

    pub fn is_series(&self) -> bool { self.dims.len() == 3 }

    pub fn samples(&self) -> usize { self.shape.first().copied().unwrap_or(0) }

    /// Time series of one element in one sample.
    pub fn series(&self, sample: usize, dim: usize) -> Option<Vec<f64>> {
        if !self.is_series() {
            return None;
        }
        (0..self.shape[1]).map(|t| self.get(&[sample, t, dim])).collect()
    }

    /// Mean over the sample axis; shape is the remaining axes.
    pub fn sample_mean(&self) -> Vec<f64> {
        let n = self.samples();
        let width = if n == 0 { 0 } else { self.data.len() / n };
        let mut mean = vec![0.0; width];
        for chunk in self.data.chunks(width.max(1)) {
            for (m, v) in mean.iter_mut().zip(chunk) {
                *m += v;
            }
        }
        if n > 0 {
            mean.iter_mut().for_each(|m| *m /= n as f64);
        }
        mean
    }
}

/// A repetition dropped under the skip policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRepetition {
    pub repetition: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub sample_axis: SampleAxis,
    pub samples: usize,
    pub steps: usize,
    /// Original repetition index of each sample.
    #[serde(default)]
    pub repetitions: Vec<usize>,
    #[serde(default)]
    pub skipped: Vec<SkippedRepetition>,
    pub variables: BTreeMap<String, LabeledArray>,
}

impl Trace {
    pub fn get(&self, name: &str) -> Option<&LabeledArray> { self.variables.get(name) }

    /// Shorthand for element 0 of sample `sample`.
    pub fn series(&self, name: &str, sample: usize) -> Option<Vec<f64>> { self.get(name)?.series(sample, 0) }

    /// Value of a Metric or Scalar element in one sample.
    pub fn scalar(&self, name: &str, sample: usize, dim: usize) -> Option<f64> {
        let array = self.get(name)?;
        if array.is_series() {
            return array.get(&[sample, self.steps, dim]);
        }
        array.get(&[sample, dim])
    }

    /// Mean over samples; `[t * dim]` for series, `[dim]` otherwise.
    pub fn mean(&self, name: &str) -> Option<Vec<f64>> { self.get(name).map(|a| a.sample_mean()) }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string(self) }

    pub fn save_json(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Accumulates per-sample values into labeled arrays.
pub(crate) struct TraceBuilder<'a> {
    model: &'a FlatModel,
    steps: usize,
    axis: SampleAxis,
    samples: usize,
    data: Vec<Vec<f64>>,
}

impl<'a> TraceBuilder<'a> {
    pub fn new(model: &'a FlatModel, steps: usize, axis: SampleAxis) -> Self {
        Self { model, steps, axis, samples: 0, data: vec![Vec::new(); model.registry.count()] }
    }

    /// Appends one sample. `value(id, t)` yields the recorded value of a
    /// series node at step `t`, or the single value of any other node when
    /// `t` is `None`; values are broadcast to the declared dimension.
    pub fn push_sample<F>(&mut self, mut value: F)
    where
        F: FnMut(NodeId, Option<usize>) -> Option<Value>,
    {
        let registry = &self.model.registry;
        for id in registry.ids() {
            let dim = registry.meta[id.index()].dim;
            let out = &mut self.data[id.index()];
            let mut extend = |v: Option<Value>| match v {
                Some(v) => out.extend((0..dim).map(|i| v.get_at(i))),
                None => out.extend(std::iter::repeat(f64::NAN).take(dim)),
            };
            if registry.kind(id).is_series() {
                for t in 0..=self.steps {
                    extend(value(id, Some(t)));
                }
            } else {
                extend(value(id, None));
            }
        }
        self.samples += 1;
    }

    pub fn finish(self, repetitions: Vec<usize>, skipped: Vec<SkippedRepetition>) -> Trace {
        let registry = &self.model.registry;
        let sample_label = self.axis.label().to_string();
        let variables = registry
            .ids()
            .zip(self.data)
            .map(|(id, data)| {
                let meta = &registry.meta[id.index()];
                let kind = registry.kind(id);
                let (dims, shape) = if kind.is_series() {
                    (vec![sample_label.clone(), "t".into(), "dim".into()], vec![self.samples, self.steps + 1, meta.dim])
                } else {
                    (vec![sample_label.clone(), "dim".into()], vec![self.samples, meta.dim])
                };
                (meta.name.clone(), LabeledArray { kind, dims, shape, data })
            })
            .collect();
        Trace { sample_axis: self.axis, samples: self.samples, steps: self.steps, repetitions, skipped, variables }
    }
}
