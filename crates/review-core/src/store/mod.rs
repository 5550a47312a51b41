//! Traits de persistencia del core y backend en memoria.
pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{ApplicationStore, Commit, OutboxStore, PipelineRepository, PlacementFilter, VersionConflict,
                 WorkflowSeed, WriteOutcome};
