//! Motor de transiciones: resuelve una acción (o un destino directo),
//! valida precondiciones, aplica la mutación y agrega una entrada de
//! auditoría, todo en un único `modify` atómico.

pub mod apply;
pub mod core;

pub use self::apply::{apply_effect, notifications_for, AppliedChanges};
pub use self::core::{Invocation, ReviewInput, TransitionEngine, TransitionSummary};
