//! Python extension module (`_core`), built with the `extension-module`
//! feature.
mod python;
