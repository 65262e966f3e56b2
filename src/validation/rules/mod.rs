pub(crate) mod dimensions;
pub(crate) mod priors;
pub(crate) mod tables;
pub(crate) mod usage;
pub(crate) mod wiring;
