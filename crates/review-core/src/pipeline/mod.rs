//! Configuración del pipeline: workflows, stages, grupos y acciones.
//!
//! Aplica los defaults de color/icono del workspace y protege las entidades
//! de sistema sembradas con cada workflow.

pub mod service;

pub use service::{ActionUpdate, GroupUpdate, NewAction, NewApplicationGroup, NewStage, NewStageGroup, PipelineService,
                  StageUpdate};
