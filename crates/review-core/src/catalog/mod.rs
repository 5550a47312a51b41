//! Catálogo de acciones: tres fuentes de configuración que convergen en un
//! único `Effect`.
//!
//! - Workflow Actions y Stage Actions: entidades explícitas, por id.
//! - Status Action Rules: implícitas, por `(stage_id, label)`. Un label sin
//!   regla sigue siendo válido y resuelve a un efecto vacío.

pub mod effect;
pub mod resolver;

pub use effect::{ActionEffect, Effect, Target};
pub use resolver::{ActionCatalog, ActionRef};
