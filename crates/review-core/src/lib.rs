//! review-core: motor de revisión de aplicaciones.
//!
//! Resuelve acciones configuradas, mueve aplicaciones por el pipeline con
//! historial append-only y gobierna las ediciones del postulante con
//! versionado optimista. La persistencia y las notificaciones son traits.
pub mod catalog;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod hashing;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod versioning;

pub use catalog::{ActionCatalog, ActionEffect, ActionRef, Effect, Target};
pub use engine::{Invocation, ReviewInput, TransitionEngine, TransitionSummary};
pub use errors::{ReviewError, StoreError};
pub use notify::{DrainReport, InMemoryNotifier, LogNotifier, NotificationEvent, Notifier, NotifyError, OutboxDispatcher,
                 PendingEffect};
pub use pipeline::PipelineService;
pub use store::{ApplicationStore, Commit, InMemoryStore, OutboxStore, PipelineRepository, PlacementFilter, WorkflowSeed,
                WriteOutcome};
pub use versioning::{AutosaveReceipt, ConcurrencyController, VersionDiff};
