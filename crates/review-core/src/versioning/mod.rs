//! Versionado optimista de `data` (el payload del postulante).
//!
//! Independiente del estado de revisión: nada aquí mueve una aplicación de
//! stage o grupo, salvo `submit`, que la coloca en el stage inicial.

pub mod controller;
pub mod merge;

pub use controller::{AutosaveReceipt, ConcurrencyController, FieldChange, VersionDiff};
pub use merge::merge_object;
