//! Human-readable reports over finished runs.
pub mod audit;

pub use audit::format_audit;
