//! Deterministic evaluation: kernels, the shared evaluator, the time stepper
//! and the simulation engine.
pub mod engine;
pub mod eval;
pub mod kernel;
pub mod ledger;
pub mod stepper;
pub mod trace;

pub use engine::simulate;
pub use eval::{Domain, Evaluator, Numeric};
pub use ledger::{Ledger, NumericFault, RuntimeError, SimulationError};
pub use trace::{LabeledArray, SampleAxis, SkippedRepetition, Trace};
