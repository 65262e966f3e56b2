//! Authoring surface: expressions, References, and the hierarchical model
//! that flattens into a `FlatModel`.
pub mod expr;
pub mod flat;
pub mod model;
pub mod ops;
pub mod reference;

pub use expr::{BinaryOp, Expr, MathFn, ReduceOp, RefUse};
pub use flat::FlatModel;
pub use model::Model;
pub use reference::{Ref, Reference};
