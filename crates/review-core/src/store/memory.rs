//! Backend en memoria de los tres traits de almacenamiento.
//!
//! Cada aplicación vive en una entrada de `DashMap`; `modify` mantiene el
//! lock de esa entrada mientras aplica el closure y agrega auditoría,
//! snapshot y efectos, de modo que el read-modify-write es atómico por
//! registro. Las operaciones de configuración que tocan varias tablas se
//! serializan con `pipeline_lock`.

use chrono::Utc;
use dashmap::DashMap;
use review_domain::{ActionDefinition, ActionScope, Application, ApplicationGroup, AuditEntry, HistoryKind, Placement,
                    Stage, StageGroup, SubmissionVersion, Workflow};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::traits::{ApplicationStore, Commit, OutboxStore, PipelineRepository, PlacementFilter, WorkflowSeed};
use crate::errors::{ReviewError, StoreError};
use crate::notify::{EffectState, PendingEffect};

#[derive(Default)]
pub struct InMemoryStore {
    applications: DashMap<Uuid, Application>,
    histories: DashMap<(Uuid, HistoryKind), Vec<AuditEntry>>,
    versions: DashMap<Uuid, Vec<SubmissionVersion>>,
    outbox: Mutex<Vec<PendingEffect>>,
    audit_seq: AtomicI64,
    workflows: DashMap<Uuid, Workflow>,
    stages: DashMap<Uuid, Stage>,
    stage_groups: DashMap<Uuid, StageGroup>,
    application_groups: DashMap<Uuid, ApplicationGroup>,
    actions: DashMap<Uuid, ActionDefinition>,
    pipeline_lock: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Todos los efectos del outbox, en cualquier estado (diagnóstico/tests).
    pub fn effects(&self) -> Vec<PendingEffect> {
        self.outbox.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn pipeline_guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.pipeline_lock
            .lock()
            .map_err(|_| StoreError::Backend("pipeline lock poisoned".into()))
    }
}

fn insert_new<T: Clone>(map: &DashMap<Uuid, T>, id: Uuid, value: &T, what: &str) -> Result<(), StoreError> {
    match map.entry(id) {
        dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(format!("{what} {id}"))),
        dashmap::mapref::entry::Entry::Vacant(v) => {
            v.insert(value.clone());
            Ok(())
        }
    }
}

fn replace_existing<T: Clone>(map: &DashMap<Uuid, T>, id: Uuid, value: &T, what: &str) -> Result<(), StoreError> {
    match map.get_mut(&id) {
        Some(mut slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(StoreError::NotFound(format!("{what} {id}"))),
    }
}

fn fetch<T: Clone>(map: &DashMap<Uuid, T>, id: Uuid, what: &str) -> Result<T, StoreError> {
    map.get(&id)
       .map(|v| v.value().clone())
       .ok_or_else(|| StoreError::NotFound(format!("{what} {id}")))
}

impl ApplicationStore for InMemoryStore {
    fn insert(&self, application: &Application) -> Result<(), StoreError> {
        insert_new(&self.applications, application.id, application, "application")
    }

    fn load(&self, id: Uuid) -> Result<Application, StoreError> {
        fetch(&self.applications, id, "application")
    }

    fn modify<T, F>(&self, id: Uuid, f: F) -> Result<T, ReviewError>
        where F: FnOnce(&mut Application) -> Result<(T, Commit), ReviewError>
    {
        let mut entry = self.applications
                            .get_mut(&id)
                            .ok_or_else(|| ReviewError::not_found("application", id))?;
        let mut draft = entry.value().clone();
        let now = Utc::now();
        draft.updated_at = now;
        let (value, commit) = f(&mut draft)?;
        if !commit.is_write() {
            return Ok(value);
        }
        // `delete_stage_group` quita el grupo antes de barrer aplicaciones:
        // o lo vemos ausente aquí, o su barrido espera a este entry.
        if let Some(group_id) = draft.stage_group_id() {
            if !self.stage_groups.contains_key(&group_id) {
                return Err(ReviewError::not_found("stage group", group_id));
            }
        }
        // Único paso falible: se toma antes de escribir nada.
        let mut outbox = self.outbox
                             .lock()
                             .map_err(|_| ReviewError::Internal("outbox lock poisoned".into()))?;
        if let Some(audit) = commit.audit {
            let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let kind = audit.history;
            self.histories
                .entry((id, kind))
                .or_default()
                .push(audit.into_entry(id, seq, now));
        }
        if let Some(snapshot) = commit.snapshot {
            self.versions.entry(id).or_default().push(snapshot);
        }
        outbox.extend(commit.effects);
        *entry = draft;
        Ok(value)
    }

    fn history(&self, id: Uuid, kind: HistoryKind) -> Result<Vec<AuditEntry>, StoreError> {
        if !self.applications.contains_key(&id) {
            return Err(StoreError::NotFound(format!("application {id}")));
        }
        Ok(self.histories.get(&(id, kind)).map(|h| h.clone()).unwrap_or_default())
    }

    fn versions(&self, id: Uuid, limit: usize) -> Result<Vec<SubmissionVersion>, StoreError> {
        if !self.applications.contains_key(&id) {
            return Err(StoreError::NotFound(format!("application {id}")));
        }
        let mut out = self.versions.get(&id).map(|v| v.clone()).unwrap_or_default();
        out.sort_by(|a, b| b.version.cmp(&a.version));
        out.truncate(limit);
        Ok(out)
    }

    fn version(&self, id: Uuid, version: i64) -> Result<SubmissionVersion, StoreError> {
        self.versions
            .get(&id)
            .and_then(|v| v.iter().find(|s| s.version == version).cloned())
            .ok_or_else(|| StoreError::NotFound(format!("version {version} of application {id}")))
    }

    fn list_by_placement(&self, filter: PlacementFilter) -> Result<Vec<Application>, StoreError> {
        let mut out: Vec<Application> =
            self.applications
                .iter()
                .filter(|a| match filter {
                    PlacementFilter::Stage(id) => a.stage_id() == Some(id),
                    PlacementFilter::StageGroup(id) => a.stage_group_id() == Some(id),
                    PlacementFilter::Group(id) => a.group_id() == Some(id),
                })
                .map(|a| a.value().clone())
                .collect();
        out.sort_by_key(|a| a.created_at);
        Ok(out)
    }

    fn find_by_applicant(&self, form_id: Uuid, applicant_id: &str) -> Result<Option<Application>, StoreError> {
        Ok(self.applications
               .iter()
               .filter(|a| a.form_id == form_id && a.applicant_id.as_deref() == Some(applicant_id))
               .min_by_key(|a| a.created_at)
               .map(|a| a.value().clone()))
    }
}

impl PipelineRepository for InMemoryStore {
    fn seed_workflow(&self, seed: &WorkflowSeed) -> Result<(), StoreError> {
        let _guard = self.pipeline_guard()?;
        // Validar todo antes de insertar nada.
        if self.workflows.contains_key(&seed.workflow.id) {
            return Err(StoreError::Duplicate(format!("workflow {}", seed.workflow.id)));
        }
        if let Some(g) = seed.groups.iter().find(|g| self.application_groups.contains_key(&g.id)) {
            return Err(StoreError::Duplicate(format!("application group {}", g.id)));
        }
        if let Some(a) = seed.actions.iter().find(|a| self.actions.contains_key(&a.id)) {
            return Err(StoreError::Duplicate(format!("action {}", a.id)));
        }
        self.workflows.insert(seed.workflow.id, seed.workflow.clone());
        for g in &seed.groups {
            self.application_groups.insert(g.id, g.clone());
        }
        for a in &seed.actions {
            self.actions.insert(a.id, a.clone());
        }
        Ok(())
    }

    fn workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        fetch(&self.workflows, id, "workflow")
    }

    fn insert_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        insert_new(&self.stages, stage.id, stage, "stage")
    }

    fn update_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        replace_existing(&self.stages, stage.id, stage, "stage")
    }

    fn stage(&self, id: Uuid) -> Result<Stage, StoreError> {
        fetch(&self.stages, id, "stage")
    }

    fn stages(&self, workflow_id: Uuid) -> Result<Vec<Stage>, StoreError> {
        let mut out: Vec<Stage> = self.stages
                                      .iter()
                                      .filter(|s| s.workflow_id == workflow_id)
                                      .map(|s| s.value().clone())
                                      .collect();
        out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn insert_stage_group(&self, group: &StageGroup) -> Result<(), StoreError> {
        insert_new(&self.stage_groups, group.id, group, "stage group")
    }

    fn update_stage_group(&self, group: &StageGroup) -> Result<(), StoreError> {
        replace_existing(&self.stage_groups, group.id, group, "stage group")
    }

    fn stage_group(&self, id: Uuid) -> Result<StageGroup, StoreError> {
        fetch(&self.stage_groups, id, "stage group")
    }

    fn stage_groups(&self, stage_id: Uuid) -> Result<Vec<StageGroup>, StoreError> {
        let mut out: Vec<StageGroup> = self.stage_groups
                                           .iter()
                                           .filter(|g| g.stage_id == stage_id)
                                           .map(|g| g.value().clone())
                                           .collect();
        out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn delete_stage_group(&self, id: Uuid) -> Result<usize, StoreError> {
        let _guard = self.pipeline_guard()?;
        if self.stage_groups.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("stage group {id}")));
        }
        let now = Utc::now();
        let mut cleared = 0;
        for mut app in self.applications.iter_mut() {
            if let Placement::InStage { stage_group_id, .. } = &mut app.review.placement {
                if *stage_group_id == Some(id) {
                    *stage_group_id = None;
                    app.updated_at = now;
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }

    fn insert_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError> {
        insert_new(&self.application_groups, group.id, group, "application group")
    }

    fn update_application_group(&self, group: &ApplicationGroup) -> Result<(), StoreError> {
        replace_existing(&self.application_groups, group.id, group, "application group")
    }

    fn application_group(&self, id: Uuid) -> Result<ApplicationGroup, StoreError> {
        fetch(&self.application_groups, id, "application group")
    }

    fn application_groups(&self, workflow_id: Uuid) -> Result<Vec<ApplicationGroup>, StoreError> {
        let mut out: Vec<ApplicationGroup> = self.application_groups
                                                 .iter()
                                                 .filter(|g| g.workflow_id == workflow_id)
                                                 .map(|g| g.value().clone())
                                                 .collect();
        out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn delete_application_group(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.pipeline_guard()?;
        if !self.application_groups.contains_key(&id) {
            return Err(StoreError::NotFound(format!("application group {id}")));
        }
        let occupied = self.applications.iter().any(|a| a.group_id() == Some(id));
        let targeted = self.actions.iter().any(|a| a.target_group_id == Some(id));
        if occupied || targeted {
            return Err(StoreError::InUse(format!("application group {id}")));
        }
        self.application_groups.remove(&id);
        Ok(())
    }

    fn insert_action(&self, action: &ActionDefinition) -> Result<(), StoreError> {
        insert_new(&self.actions, action.id, action, "action")
    }

    fn update_action(&self, action: &ActionDefinition) -> Result<(), StoreError> {
        replace_existing(&self.actions, action.id, action, "action")
    }

    fn action(&self, id: Uuid) -> Result<ActionDefinition, StoreError> {
        fetch(&self.actions, id, "action")
    }

    fn actions(&self, scope: ActionScope) -> Result<Vec<ActionDefinition>, StoreError> {
        let mut out: Vec<ActionDefinition> = self.actions
                                                 .iter()
                                                 .filter(|a| a.scope == scope)
                                                 .map(|a| a.value().clone())
                                                 .collect();
        out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    fn delete_action(&self, id: Uuid) -> Result<(), StoreError> {
        self.actions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("action {id}")))
    }
}

impl OutboxStore for InMemoryStore {
    fn pending_effects(&self, limit: usize) -> Result<Vec<PendingEffect>, StoreError> {
        let outbox = self.outbox
                         .lock()
                         .map_err(|_| StoreError::Backend("outbox lock poisoned".into()))?;
        Ok(outbox.iter()
                 .filter(|e| e.state == EffectState::Pending)
                 .take(limit)
                 .cloned()
                 .collect())
    }

    fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError> {
        let mut outbox = self.outbox
                             .lock()
                             .map_err(|_| StoreError::Backend("outbox lock poisoned".into()))?;
        let effect = outbox.iter_mut()
                           .find(|e| e.id == id)
                           .ok_or_else(|| StoreError::NotFound(format!("effect {id}")))?;
        effect.state = EffectState::Delivered;
        Ok(())
    }

    fn record_failure(&self, id: Uuid, error: &str, abandon: bool) -> Result<(), StoreError> {
        let mut outbox = self.outbox
                             .lock()
                             .map_err(|_| StoreError::Backend("outbox lock poisoned".into()))?;
        let effect = outbox.iter_mut()
                           .find(|e| e.id == id)
                           .ok_or_else(|| StoreError::NotFound(format!("effect {id}")))?;
        effect.attempts += 1;
        effect.last_error = Some(error.to_string());
        if abandon {
            effect.state = EffectState::Abandoned;
        }
        Ok(())
    }
}
