#![allow(dead_code)]

use std::sync::Arc;

use review_core::pipeline::{NewStage, NewStageGroup};
use review_core::{ConcurrencyController, InMemoryStore, PipelineService, TransitionEngine};
use review_domain::{Application, Stage, StageGroup, Workflow};
use uuid::Uuid;

/// Workflow sembrado con dos stages y un stage group en el primero.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub pipeline: PipelineService<InMemoryStore>,
    pub engine: TransitionEngine<InMemoryStore, InMemoryStore>,
    pub versions: ConcurrencyController<InMemoryStore, InMemoryStore>,
    pub workflow: Workflow,
    pub rejected_group: Uuid,
    pub waitlist_group: Uuid,
    pub reject_action: Uuid,
    pub screening: Stage,
    pub interview: Stage,
    pub priority: StageGroup,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PipelineService::new(store.clone());
        let seed = pipeline.create_workflow(Uuid::new_v4(), "Admissions 2026", None).unwrap();
        let screening = pipeline.create_stage(seed.workflow.id, NewStage { name: "Screening".into(),
                                                                          ..Default::default() })
                                .unwrap();
        let interview = pipeline.create_stage(seed.workflow.id, NewStage { name: "Interview".into(),
                                                                          ..Default::default() })
                                .unwrap();
        let priority = pipeline.create_stage_group(screening.id, NewStageGroup { name: "Priority".into(),
                                                                                ..Default::default() })
                               .unwrap();
        Self { engine: TransitionEngine::new(store.clone(), store.clone()),
               versions: ConcurrencyController::new(store.clone(), store.clone()),
               rejected_group: seed.groups[0].id,
               waitlist_group: seed.groups[1].id,
               reject_action: seed.actions[0].id,
               workflow: seed.workflow,
               store,
               pipeline,
               screening,
               interview,
               priority }
    }

    /// Borrador enviado, por lo tanto ubicado en el stage inicial.
    pub fn submitted(&self) -> Application {
        let draft = self.versions
                        .open_draft(Uuid::new_v4(), Some(self.workflow.id), Some("applicant-1"))
                        .unwrap();
        self.versions.submit(draft.id, Some("applicant-1")).unwrap()
    }
}
