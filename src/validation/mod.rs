//! Definition-time checks run when a model is flattened.
pub mod error;
mod rules;
pub mod validator;

pub use error::DefinitionError;
pub use validator::Validator;
