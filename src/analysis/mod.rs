//! Static analysis of flattened models.
pub mod topology;

pub use topology::{resolve, Schedule};
