//! Stock-and-flow models as typed expression graphs.
//!
//! A [`graph::Model`] is authored in two phases: References are registered
//! by name, then equations, bounds, priors and wiring are bound through the
//! returned handles. Flattening resolves the tree into a
//! [`graph::FlatModel`], which either runs as a discrete-time Monte Carlo
//! simulation ([`compute::simulate`]) or is compiled into a forward model for
//! an inference engine ([`solver::infer`]). Both produce the same labeled
//! [`compute::Trace`].
pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod graph;
pub mod solver;
pub mod store;
pub mod validation;

#[cfg(feature = "extension-module")]
mod bindings;

pub use compute::{SimulationError, Trace};
pub use config::{FailurePolicy, InferConfig, RunConfig};
pub use error::{Error, Result};
pub use graph::{ops, Expr, FlatModel, Model, Ref, Reference};
pub use solver::{CancelToken, InferenceError, Observation};
pub use store::{Distribution, Dtype, FreeValue, RefKind, Value};
pub use validation::DefinitionError;
