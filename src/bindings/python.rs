use crate::compute::Trace;
use crate::config::{FailurePolicy, InferConfig, RunConfig};
use crate::display::format_audit;
use crate::graph::Model;
use crate::solver::Observation;
use crate::store::{FreeValue, ModelRecord};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn value_err(e: impl std::fmt::Display) -> PyErr { PyValueError::new_err(e.to_string()) }
fn runtime_err(e: impl std::fmt::Display) -> PyErr { PyRuntimeError::new_err(e.to_string()) }

/// A model exchanged with Python as a JSON record.
#[pyclass(name = "_Model")]
#[derive(Debug, Clone)]
pub struct PyModel {
    inner: Model,
}

#[pymethods]
impl PyModel {
    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<Self> {
        let record = ModelRecord::from_json(json).map_err(value_err)?;
        Ok(Self { inner: Model::from_record(&record).map_err(value_err)? })
    }

    pub fn to_json(&self) -> PyResult<String> {
        self.inner.to_record().map_err(value_err)?.to_json().map_err(value_err)
    }

    pub fn validate(&self) -> PyResult<()> { self.inner.flatten().map(|_| ()).map_err(value_err) }

    #[pyo3(signature = (recursive = true))]
    pub fn free_refs(&self, recursive: bool) -> Vec<String> { self.inner.free_refs(recursive) }

    pub fn config(&self) -> PyResult<String> { serde_json::to_string(&self.inner.config()).map_err(value_err) }

    /// `value` is JSON: a number, an array, or a `{"dist": ...}` object.
    pub fn set_free(&mut self, name: &str, value: &str) -> PyResult<()> {
        let value: FreeValue = serde_json::from_str(value).map_err(value_err)?;
        self.inner.set_free(name, value).map_err(value_err)
    }

    /// Returns the trace as JSON.
    #[pyo3(signature = (steps, repetitions = 1, seed = 0, skip_failures = false))]
    pub fn simulate(&self, steps: usize, repetitions: usize, seed: u64, skip_failures: bool) -> PyResult<String> {
        let policy = if skip_failures { FailurePolicy::Skip } else { FailurePolicy::Abort };
        let config = RunConfig::new(steps, repetitions).seed(seed).failure_policy(policy);
        let trace = self.inner.simulate_with(&config).map_err(runtime_err)?;
        trace.to_json().map_err(value_err)
    }

    /// `observations` is a JSON list of `{"metric", "data", "tolerance"}`;
    /// `config` an optional JSON inference configuration.
    #[pyo3(signature = (observations, prior_only = false, config = None))]
    pub fn infer(&self, observations: &str, prior_only: bool, config: Option<&str>) -> PyResult<String> {
        let observations: Vec<Observation> = serde_json::from_str(observations).map_err(value_err)?;
        let config = match config {
            Some(json) => InferConfig::from_json(json).map_err(value_err)?,
            None => InferConfig::default(),
        };
        let trace = self.inner.infer(&observations, prior_only, &config).map_err(runtime_err)?;
        trace.to_json().map_err(value_err)
    }

    pub fn audit(&self, target: &str, trace: &str) -> PyResult<String> {
        let trace: Trace = serde_json::from_str(trace).map_err(value_err)?;
        let flat = self.inner.flatten().map_err(value_err)?;
        Ok(format_audit(&flat, &trace, target))
    }
}

/// Defines the `_core` Python module.
#[pymodule]
fn _core(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyModel>()?;
    Ok(())
}
