//! The central validator that orchestrates the execution of all validation rules.
use super::error::DefinitionError;
use super::rules::{dimensions, priors, tables, usage, wiring};
use crate::store::Registry;

/// Runs every rule against a flattened registry, collecting all errors
/// before any evaluation happens.
pub struct Validator<'a> {
    registry: &'a Registry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// # Returns
    /// - `Ok(())` if no rule fires.
    /// - `Err(errors)` with every problem found, in declaration order.
    pub fn validate(&self) -> Result<(), Vec<DefinitionError>> {
        let mut errors = Vec::new();

        // Rules are local to a node and its direct references, so a plain
        // scan is enough; ordering happens later in the resolver.
        for id in self.registry.ids() {
            if let Some(err) = usage::validate_equation_present(self.registry, id) {
                errors.push(err);
            }
            errors.extend(usage::validate_usage(self.registry, id));
            errors.extend(dimensions::validate_dimensions(self.registry, id));
            errors.extend(tables::validate_tables(self.registry, id));
            errors.extend(tables::validate_piecewise(self.registry, id));
            errors.extend(priors::validate_priors(self.registry, id));
        }
        errors.extend(wiring::validate_wiring(self.registry));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
