//! Flat storage of resolved models and the value types shared by every layer.
pub mod distribution;
pub mod record;
pub mod registry;
pub mod types;
pub mod value;

pub use distribution::Distribution;
pub use record::{ItemRecord, ModelRecord, ReferenceRecord, WireRecord};
pub use registry::{Bounds, Registry};
pub use types::*;
pub use value::{broadcast_len, Elements, Value};
