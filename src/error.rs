//! Crate-level error for entry points that cross layers (file I/O, records,
//! runs).
use crate::compute::SimulationError;
use crate::solver::InferenceError;
use crate::validation::DefinitionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
