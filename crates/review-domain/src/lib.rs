//! review-domain: entidades tipadas del pipeline de revisión.
//!
//! Contiene únicamente datos y reglas puras (sin IO): la `Application`
//! gestionada por el motor, la configuración del pipeline (workflows, stages,
//! grupos), el catálogo de acciones, las reglas por status, las entradas de
//! auditoría y los snapshots de versión.

pub mod action;
pub mod application;
pub mod audit;
pub mod error;
pub mod pipeline;
pub mod status_rule;
pub mod version;

pub use action::{ActionDefinition, ActionScope, ActionType};
pub use application::{Application, Placement, ReviewState, TagDelta, STATUS_DRAFT, STATUS_SUBMITTED};
pub use audit::{AuditDetail, AuditEntry, HistoryKind, NewAuditEntry};
pub use error::DomainError;
pub use pipeline::{normalized_name, ApplicationGroup, CustomStatus, Stage, StageGroup, Workflow};
pub use status_rule::{parse_status_actions, StatusActionRule};
pub use version::{changed_fields, ChangeType, SubmissionVersion};
