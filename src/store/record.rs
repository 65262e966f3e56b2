//! Tree-shaped definition records.
//!
//! A `ModelRecord` mirrors the nesting of the authored model. Equation leaves
//! and wiring endpoints are qualified names relative to the outermost record,
//! so a record is self-contained and can be rebuilt without live keys.

use super::distribution::Distribution;
use super::types::{Dtype, FlowDirection, FreeValue, RefKind};
use crate::graph::Expr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<usize>,
    /// References and sub-models in declaration order.
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub wires: Vec<WireRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ItemRecord {
    Reference(ReferenceRecord),
    Model(ModelRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub name: String,
    pub kind: RefKind,
    #[serde(default)]
    pub dtype: Dtype,
    pub dim: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equation: Option<Expr<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<FreeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Expr<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Expr<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<Distribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub stock: String,
    pub source: String,
    pub direction: FlowDirection,
}

impl ModelRecord {
    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }

    pub fn from_json(json: &str) -> serde_json::Result<Self> { serde_json::from_str(json) }

    pub fn save_json(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}
